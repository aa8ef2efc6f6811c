// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The peer worker: executes one probe end to end.
//!
//! A probe connects, negotiates a request substream, sweeps the remote's
//! routing buckets with preimage-steered FIND_NODEs, and harvests the
//! identify data. Everything after a successful connect is best-effort:
//! neighbors gathered before a failure are returned alongside the error.

use crate::{
    addr::PeerAddr,
    config::{CrawlerConfig, WorkerConfig},
    plugin::{Plugin, PluginOutcome},
    preimage::{PreimageTable, MAX_CPL},
    protocol::ProtocolError,
    transport::{Endpoint, RequestStream},
    Error, Result,
};
use chrono::{DateTime, Utc};
use libp2p::PeerId;
use rand::Rng;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// The sweep always asks for at least this many buckets before the
/// no-new-peers rule may stop it. Low buckets overlap heavily between
/// remotes, so an early empty delta is not yet meaningful.
const MIN_BUCKETS: u32 = 4;

/// Everything a single successful (or partially successful) probe
/// learned about a peer.
#[derive(Debug)]
pub struct RawNodeInfo {
    /// Routing-table neighbors, deduplicated by peer id across the
    /// whole sweep, first occurrence kept.
    pub neighbors: Vec<PeerAddr>,
    pub agent_version: Option<String>,
    pub supported_protocols: Vec<String>,
    pub begin_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Set when the sweep failed after the connect phase; the neighbors
    /// gathered up to that point are still present.
    pub crawl_error: Option<Error>,
    pub plugin_data: BTreeMap<String, PluginOutcome>,
}

/// Owns one overlay endpoint and probes peers with it.
///
/// Stateless between probes apart from the endpoint itself; safe to
/// share across concurrent probe tasks.
pub struct Worker {
    id: usize,
    endpoint: Arc<dyn Endpoint>,
    preimages: Arc<PreimageTable>,
    worker_config: WorkerConfig,
    crawler_config: CrawlerConfig,
    plugins: Vec<Arc<dyn Plugin>>,
    crawl_attempts: AtomicU64,
    crawl_errors: AtomicU64,
}

impl Worker {
    pub fn new(
        id: usize,
        endpoint: Arc<dyn Endpoint>,
        preimages: Arc<PreimageTable>,
        worker_config: WorkerConfig,
        crawler_config: CrawlerConfig,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        Self {
            id,
            endpoint,
            preimages,
            worker_config,
            crawler_config,
            plugins,
            crawl_attempts: AtomicU64::new(0),
            crawl_errors: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.endpoint.local_peer_id()
    }

    /// Probe one peer.
    ///
    /// `Err` means the connect phase failed and nothing was learned.
    /// `Ok` means the peer was reachable; `crawl_error` inside carries
    /// any post-connect failure.
    pub async fn crawl(&self, target: &PeerAddr) -> Result<RawNodeInfo> {
        self.crawl_attempts.fetch_add(1, Ordering::Relaxed);

        let remote = target.strip_unroutable();
        debug!(worker = self.id, peer = %remote, "worker connecting");
        if remote.addrs.is_empty() {
            self.crawl_errors.fetch_add(1, Ordering::Relaxed);
            return Err(Error::OnlyLocalAddrs(target.peer_id));
        }

        // De-sync parallel workers so dials don't land in bursts.
        if self.worker_config.desync_millis > 0 {
            let delay = rand::thread_rng().gen_range(0..self.worker_config.desync_millis);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.connect(&remote).await.inspect_err(|_| {
            self.crawl_errors.fetch_add(1, Ordering::Relaxed);
        })?;

        let begin_ts = Utc::now();

        let (neighbors, crawl_error) = match self.open_stream(&remote.peer_id).await {
            Ok(mut stream) => {
                debug!(
                    worker = self.id,
                    peer = %remote.peer_id,
                    protocol = stream.protocol(),
                    "request stream negotiated"
                );
                self.bucket_sweep(stream.as_mut(), &remote.peer_id).await
            }
            Err(err) => (Vec::new(), Some(err)),
        };
        if crawl_error.is_some() {
            self.crawl_errors.fetch_add(1, Ordering::Relaxed);
        }

        let mut plugin_data = BTreeMap::new();
        for plugin in &self.plugins {
            debug!(
                worker = self.id,
                remote = %remote.peer_id,
                plugin = plugin.name(),
                "executing plugin"
            );
            let outcome = match plugin.handle_peer(&remote).await {
                Ok(value) => PluginOutcome::success(value),
                Err(err) => {
                    debug!(
                        worker = self.id,
                        remote = %remote.peer_id,
                        plugin = plugin.name(),
                        %err,
                        "plugin failed"
                    );
                    PluginOutcome::failure(err)
                }
            };
            plugin_data.insert(plugin.name().to_string(), outcome);
        }

        let (agent_version, supported_protocols) =
            match self.endpoint.identify_info(&remote.peer_id).await {
                Some(info) => (info.agent_version, info.protocols),
                None => {
                    debug!(worker = self.id, peer = %remote.peer_id, "no identify data");
                    (None, Vec::new())
                }
            };

        Ok(RawNodeInfo {
            neighbors,
            agent_version,
            supported_protocols,
            begin_ts,
            end_ts: Utc::now(),
            crawl_error,
            plugin_data,
        })
    }

    async fn connect(&self, remote: &PeerAddr) -> Result<()> {
        let deadline = self.worker_config.connect_timeout();
        let mut last_err = String::from("no connection attempts made");

        for attempt in 1..=self.worker_config.connection_attempts {
            match tokio::time::timeout(deadline, self.endpoint.connect(remote)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => {
                    debug!(worker = self.id, %err, attempt, peer = %remote.peer_id, "could not connect");
                    last_err = match err {
                        Error::ConnectFailed(reason) => reason,
                        other => other.to_string(),
                    };
                }
                Err(_) => {
                    debug!(worker = self.id, attempt, peer = %remote.peer_id, "connect timed out");
                    last_err = format!("timed out after {deadline:?}");
                }
            }
        }

        Err(Error::ConnectFailed(last_err))
    }

    async fn open_stream(&self, remote: &PeerId) -> Result<Box<dyn RequestStream>> {
        let deadline = self.crawler_config.interaction_timeout();
        let mut last_err = String::from("no protocols configured");

        for attempt in 1..=self.crawler_config.interaction_attempts {
            for protocol in &self.crawler_config.protocol_strings {
                match tokio::time::timeout(deadline, self.endpoint.open_stream(remote, protocol))
                    .await
                {
                    Ok(Ok(stream)) => return Ok(stream),
                    Ok(Err(err)) => {
                        debug!(worker = self.id, %err, attempt, protocol, peer = %remote, "could not open stream");
                        last_err = match err {
                            Error::StreamOpenFailed(reason) => reason,
                            other => other.to_string(),
                        };
                    }
                    Err(_) => {
                        debug!(worker = self.id, attempt, protocol, peer = %remote, "stream open timed out");
                        last_err = format!("timed out after {deadline:?}");
                    }
                }
            }
        }

        Err(Error::StreamOpenFailed(last_err))
    }

    /// Read the remote's routing table bucket by bucket over one stream.
    ///
    /// Iterates the common prefix length from zero until a hard cap of
    /// [`MAX_CPL`], stopping early once at least [`MIN_BUCKETS`] buckets
    /// were asked and the previous bucket brought nothing new.
    async fn bucket_sweep(
        &self,
        stream: &mut dyn RequestStream,
        remote: &PeerId,
    ) -> (Vec<PeerAddr>, Option<Error>) {
        let mut neighbors: Vec<PeerAddr> = Vec::new();
        let mut seen: HashSet<PeerId> = HashSet::new();
        let mut newly_learned = usize::MAX;

        for cpl in 0..MAX_CPL {
            if cpl >= MIN_BUCKETS && newly_learned == 0 {
                break;
            }

            let target = match self.preimages.target_for_cpl(remote, cpl) {
                Ok(target) => target,
                Err(err) => return (neighbors, Some(err)),
            };
            trace!(worker = self.id, cpl, peer = %remote, "sending FIND_NODE");

            let deadline = self.crawler_config.interaction_timeout();
            let mut response = None;
            let mut last_err = None;
            for attempt in 1..=self.crawler_config.interaction_attempts {
                match tokio::time::timeout(deadline, stream.find_node(&target)).await {
                    Ok(Ok(peers)) => {
                        response = Some(peers);
                        break;
                    }
                    Ok(Err(err)) => {
                        debug!(worker = self.id, %err, attempt, cpl, peer = %remote, "FIND_NODE failed");
                        last_err = Some(err);
                    }
                    Err(_) => {
                        debug!(worker = self.id, attempt, cpl, peer = %remote, "FIND_NODE timed out");
                        last_err = Some(ProtocolError::Timeout(deadline).into());
                    }
                }
            }

            let Some(peers) = response else {
                // Whatever was gathered so far is still useful; hand it
                // back together with the final error.
                return (neighbors, last_err);
            };

            newly_learned = 0;
            for peer in peers {
                if seen.insert(peer.peer_id) {
                    neighbors.push(peer);
                    newly_learned += 1;
                }
            }
            trace!(worker = self.id, cpl, newly_learned, peer = %remote, "learned peers");
        }

        (neighbors, None)
    }

    /// Log the worker's lifetime stats and close its endpoint.
    pub async fn stop(&self) {
        let attempts = self.crawl_attempts.load(Ordering::Relaxed);
        let errors = self.crawl_errors.load(Ordering::Relaxed);
        let failed_percentage = if attempts != 0 {
            errors * 100 / attempts
        } else {
            0
        };
        info!(
            worker = self.id,
            crawl_attempts = attempts,
            crawl_errors = errors,
            failed_percentage,
            "worker finished"
        );

        for plugin in &self.plugins {
            if let Err(err) = plugin.shutdown().await {
                warn!(plugin = plugin.name(), %err, "plugin shutdown failed");
            }
        }
        self.endpoint.shutdown().await;
    }
}
