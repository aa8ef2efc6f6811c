// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The frontier and per-peer state store.
//!
//! Single-owner data structure: only the dispatch loop touches it, so no
//! locking is involved. The queue holds exactly the peers whose phase is
//! `Queued`; address bags and neighbor lists only ever grow.

use crate::{
    addr::{new_addrs, PeerAddr},
    plugin::PluginOutcome,
    worker::RawNodeInfo,
    Error,
};
use chrono::{DateTime, Utc};
use libp2p::{Multiaddr, PeerId};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Where a peer stands in its crawl lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Waiting in the frontier for a probe.
    Queued,
    /// A probe is outstanding.
    InFlight,
    /// Probed successfully. Terminal: never probed again.
    DoneOk,
    /// No connection could be established. A new address re-queues.
    DoneConnectFail,
    /// Connected, but the sweep failed (possibly after harvesting some
    /// neighbors). A new address re-queues.
    DoneCrawlFail,
}

/// Everything known about one peer.
#[derive(Debug)]
pub struct PeerState {
    pub addrs: Vec<Multiaddr>,
    pub phase: PeerPhase,
    pub neighbors: Vec<PeerId>,
    pub agent_version: Option<String>,
    pub supported_protocols: Vec<String>,
    pub crawl_begin_ts: Option<DateTime<Utc>>,
    pub crawl_end_ts: Option<DateTime<Utc>>,
    pub last_err: Option<String>,
    pub plugin_data: BTreeMap<String, PluginOutcome>,
}

impl PeerState {
    fn new(addrs: Vec<Multiaddr>) -> Self {
        Self {
            addrs,
            phase: PeerPhase::Queued,
            neighbors: Vec::new(),
            agent_version: None,
            supported_protocols: Vec::new(),
            crawl_begin_ts: None,
            crawl_end_ts: None,
            last_err: None,
            plugin_data: BTreeMap::new(),
        }
    }
}

/// Counts for the periodic status line.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontierStats {
    /// Peers ever observed.
    pub known: usize,
    /// Peers currently queued.
    pub queued: usize,
    /// Peers we managed to connect to.
    pub connectable: usize,
    /// Peers whose full sweep succeeded.
    pub crawlable: usize,
}

/// FIFO of peers awaiting a probe plus the keyed state map.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<PeerId>,
    states: HashMap<PeerId, PeerState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `peer`, possibly (re-)queueing it.
    ///
    /// Addresses are filtered for loopback/private space before the
    /// merge. A previously failed peer re-enters the queue only if the
    /// observation carries an address we have not seen for it yet; a
    /// successfully crawled peer never re-enters.
    pub fn observe(&mut self, peer: &PeerAddr) {
        let filtered = peer.strip_unroutable();

        let Some(state) = self.states.get_mut(&peer.peer_id) else {
            let addrs = new_addrs(&[], &filtered.addrs);
            self.states.insert(peer.peer_id, PeerState::new(addrs));
            self.queue.push_back(peer.peer_id);
            return;
        };

        let fresh = new_addrs(&state.addrs, &filtered.addrs);
        let learned_new_addr = !fresh.is_empty();
        state.addrs.extend(fresh);

        let failed = matches!(
            state.phase,
            PeerPhase::DoneConnectFail | PeerPhase::DoneCrawlFail
        );
        if learned_new_addr && failed {
            debug!(peer = %peer.peer_id, "re-queueing failed peer with fresh address");
            state.phase = PeerPhase::Queued;
            self.queue.push_back(peer.peer_id);
        }
    }

    /// Take the next queued peer, with the union of its known addresses.
    pub fn pop(&mut self) -> Option<PeerAddr> {
        let peer_id = self.queue.pop_front()?;
        let addrs = self
            .states
            .get(&peer_id)
            .map(|state| state.addrs.clone())
            .unwrap_or_default();
        Some(PeerAddr::new(peer_id, addrs))
    }

    pub fn mark_in_flight(&mut self, peer_id: &PeerId) {
        if let Some(state) = self.states.get_mut(peer_id) {
            state.phase = PeerPhase::InFlight;
        }
    }

    pub fn phase(&self, peer_id: &PeerId) -> Option<PeerPhase> {
        self.states.get(peer_id).map(|state| state.phase)
    }

    /// Store the outcome of a probe that got through the connect phase.
    /// Returns the probed peer's neighbors for frontier expansion.
    pub fn complete_connected(&mut self, peer_id: &PeerId, info: RawNodeInfo) -> Vec<PeerAddr> {
        let Some(state) = self.states.get_mut(peer_id) else {
            warn!(peer = %peer_id, "completed a peer that was never observed");
            return Vec::new();
        };

        state.phase = if info.crawl_error.is_none() {
            PeerPhase::DoneOk
        } else {
            PeerPhase::DoneCrawlFail
        };
        state.last_err = info.crawl_error.as_ref().map(|err| err.to_string());
        state.agent_version = info.agent_version;
        state.supported_protocols = info.supported_protocols;
        state.crawl_begin_ts = Some(info.begin_ts);
        state.crawl_end_ts = Some(info.end_ts);
        state.plugin_data.extend(info.plugin_data);

        for neighbor in &info.neighbors {
            if !state.neighbors.contains(&neighbor.peer_id) {
                state.neighbors.push(neighbor.peer_id);
            }
        }

        info.neighbors
    }

    /// Store a connect-phase failure.
    pub fn complete_connect_failed(&mut self, peer_id: &PeerId, err: &Error) {
        let Some(state) = self.states.get_mut(peer_id) else {
            warn!(peer = %peer_id, "completed a peer that was never observed");
            return;
        };
        state.phase = PeerPhase::DoneConnectFail;
        state.last_err = Some(err.to_string());
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> FrontierStats {
        let mut stats = FrontierStats {
            known: self.states.len(),
            queued: self.queue.len(),
            ..Default::default()
        };
        for state in self.states.values() {
            match state.phase {
                PeerPhase::DoneOk => {
                    stats.connectable += 1;
                    stats.crawlable += 1;
                }
                PeerPhase::DoneCrawlFail => stats.connectable += 1,
                _ => {}
            }
        }
        stats
    }

    /// Consume the store for report assembly.
    pub fn into_states(self) -> HashMap<PeerId, PeerState> {
        self.states
    }
}
