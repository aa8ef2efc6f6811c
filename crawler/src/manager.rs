// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The dispatch loop: turns a seeded frontier into a finished report.
//!
//! One coordinator task owns all crawl state. Probes run on their own
//! tasks, bounded by a channel of slot tokens; each token names the
//! worker it is pinned to. Probe outcomes are plain data on the result
//! channel, so no per-peer failure can ever stop the loop — it ends
//! exactly when the frontier is drained and nothing is in flight.

use crate::{
    addr::PeerAddr,
    frontier::{Frontier, PeerPhase},
    report::CrawlReport,
    worker::{RawNodeInfo, Worker},
    Result,
};
use chrono::Utc;
use libp2p::PeerId;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;

/// Cadence of the summary log line.
const STATUS_INTERVAL: Duration = Duration::from_secs(20);

/// One probe's outcome, as sent back to the loop.
struct ProbeResult {
    peer_id: PeerId,
    result: Result<RawNodeInfo>,
}

/// The crawl coordinator.
pub struct CrawlManager {
    workers: Vec<Arc<Worker>>,
    concurrent_requests: usize,
    frontier: Frontier,
    in_flight: HashSet<PeerId>,
    error_tally: BTreeMap<&'static str, u64>,
}

impl CrawlManager {
    /// `concurrent_requests` slot tokens are distributed round-robin
    /// over the workers; it must be at least `workers.len()` so every
    /// worker gets one.
    pub fn new(workers: Vec<Arc<Worker>>, concurrent_requests: usize) -> Self {
        debug_assert!(!workers.is_empty());
        debug_assert!(concurrent_requests >= workers.len());
        Self {
            workers,
            concurrent_requests,
            frontier: Frontier::new(),
            in_flight: HashSet::new(),
            error_tally: BTreeMap::new(),
        }
    }

    /// Run the crawl to completion and produce the report.
    pub async fn crawl(mut self, seeds: Vec<PeerAddr>) -> CrawlReport {
        let start_ts = Utc::now();
        info!(
            seeds = seeds.len(),
            workers = self.workers.len(),
            slots = self.concurrent_requests,
            "starting crawl"
        );

        for seed in &seeds {
            self.frontier.observe(seed);
        }

        // Every token carries the index of the worker it is pinned to.
        let (slot_tx, mut slot_rx) = mpsc::channel::<usize>(self.concurrent_requests);
        for token in 0..self.concurrent_requests {
            let _ = slot_tx.try_send(token % self.workers.len());
        }

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ProbeResult>();
        let mut status = tokio::time::interval(STATUS_INTERVAL);
        status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.frontier.queued_len() == 0 && self.in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some(result) = result_rx.recv() => self.integrate(result),
                Some(slot) = slot_rx.recv(), if self.frontier.queued_len() > 0 => {
                    self.dispatch(slot, &slot_tx, &result_tx);
                }
                _ = status.tick() => self.log_status(),
            }
        }

        let end_ts = Utc::now();
        self.log_status();
        info!(error_classes = ?self.error_tally, "crawl finished");

        CrawlReport::from_states(start_ts, end_ts, self.frontier.into_states())
    }

    /// Hand the next queued peer to the worker the slot token names.
    fn dispatch(
        &mut self,
        slot: usize,
        slot_tx: &mpsc::Sender<usize>,
        result_tx: &mpsc::UnboundedSender<ProbeResult>,
    ) {
        let Some(peer) = self.frontier.pop() else {
            let _ = slot_tx.try_send(slot);
            return;
        };

        // A peer that already succeeded is never probed again, even if
        // it somehow re-entered the queue.
        if self.frontier.phase(&peer.peer_id) == Some(PeerPhase::DoneOk) {
            let _ = slot_tx.try_send(slot);
            return;
        }

        // The loop is the sole owner of the frontier, so a queued peer
        // cannot also be in flight.
        debug_assert!(
            !self.in_flight.contains(&peer.peer_id),
            "popped a peer with an outstanding probe"
        );

        self.frontier.mark_in_flight(&peer.peer_id);
        self.in_flight.insert(peer.peer_id);

        let worker = Arc::clone(&self.workers[slot]);
        let slot_tx = slot_tx.clone();
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            let result = worker.crawl(&peer).await;
            let _ = result_tx.send(ProbeResult {
                peer_id: peer.peer_id,
                result,
            });
            let _ = slot_tx.send(slot).await;
        });
    }

    /// Fold a probe outcome into the state store and grow the frontier.
    fn integrate(&mut self, probe: ProbeResult) {
        let _was_in_flight = self.in_flight.remove(&probe.peer_id);
        debug_assert!(_was_in_flight, "result for a peer that was not in flight");

        match probe.result {
            Ok(info) => {
                if let Some(err) = &info.crawl_error {
                    *self.error_tally.entry(err.class()).or_default() += 1;
                }
                let neighbors = self.frontier.complete_connected(&probe.peer_id, info);
                for neighbor in &neighbors {
                    self.frontier.observe(neighbor);
                }
            }
            Err(err) => {
                *self.error_tally.entry(err.class()).or_default() += 1;
                self.frontier.complete_connect_failed(&probe.peer_id, &err);
            }
        }
    }

    fn log_status(&self) {
        let stats = self.frontier.stats();
        info!(
            known = stats.known,
            queued = stats.queued,
            in_flight = self.in_flight.len(),
            connectable = stats.connectable,
            crawlable = stats.crawlable,
            "crawl status"
        );
    }
}
