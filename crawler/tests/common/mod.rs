// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Shared test harness: a scripted in-memory endpoint.

use async_trait::async_trait;
use dht_crawler::{
    addr::PeerAddr,
    preimage::{PreimageTable, PREIMAGE_COUNT},
    protocol::ProtocolError,
    transport::{Endpoint, IdentityInfo, RequestStream},
    CrawlerConfig, Error, Result, Worker, WorkerConfig,
};
use libp2p::{Multiaddr, PeerId};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

/// Identity-mapped preimage table, built once and shared: looking up
/// prefix `i` yields `i`, which is all the mock transport needs.
pub fn test_preimages() -> Arc<PreimageTable> {
    static TABLE: OnceLock<Arc<PreimageTable>> = OnceLock::new();
    Arc::clone(TABLE.get_or_init(|| {
        Arc::new(PreimageTable::from_preimages((0..PREIMAGE_COUNT as u64).collect()).unwrap())
    }))
}

pub fn test_worker_config() -> WorkerConfig {
    WorkerConfig {
        connect_timeout_secs: 2,
        connection_attempts: 1,
        user_agent: "dht-crawler-test".into(),
        desync_millis: 0,
    }
}

pub fn test_crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        interaction_timeout_secs: 2,
        interaction_attempts: 1,
        ..CrawlerConfig::default()
    }
}

pub fn public_addr(octet: u8) -> Multiaddr {
    format!("/ip4/{octet}.{octet}.{octet}.{octet}/tcp/4001")
        .parse()
        .unwrap()
}

pub fn public_peer(octet: u8) -> PeerAddr {
    PeerAddr::new(PeerId::random(), vec![public_addr(octet)])
}

/// Script for one remote peer.
pub struct MockPeer {
    /// Outcome per connection attempt; exhausted means success.
    pub connect_results: VecDeque<std::result::Result<(), String>>,
    /// Artificial dial latency, for ordering results in tests.
    pub connect_delay: Duration,
    /// Refuse to negotiate a request substream.
    pub fail_stream_open: bool,
    /// Response per FIND_NODE; exhausted means an empty peer list.
    pub responses: VecDeque<std::result::Result<Vec<PeerAddr>, String>>,
    pub identity: Option<IdentityInfo>,
}

impl Default for MockPeer {
    fn default() -> Self {
        Self {
            connect_results: VecDeque::new(),
            connect_delay: Duration::ZERO,
            fail_stream_open: false,
            responses: VecDeque::new(),
            identity: None,
        }
    }
}

impl MockPeer {
    pub fn with_buckets(
        buckets: impl IntoIterator<Item = std::result::Result<Vec<PeerAddr>, String>>,
    ) -> Self {
        Self {
            responses: buckets.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn unreachable(reason: &str) -> Self {
        Self {
            // One failure per attempt the test configuration makes.
            connect_results: VecDeque::from([Err(reason.to_string())]),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Inner {
    peers: Mutex<HashMap<PeerId, MockPeer>>,
    connect_counts: Mutex<HashMap<PeerId, usize>>,
}

/// A scripted endpoint; peers not in the script are unreachable.
pub struct MockEndpoint {
    local: PeerId,
    inner: Arc<Inner>,
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            local: PeerId::random(),
            inner: Arc::default(),
        }
    }

    pub fn add_peer(&self, peer_id: PeerId, script: MockPeer) {
        self.inner.peers.lock().unwrap().insert(peer_id, script);
    }

    /// Connection attempts made against `peer` so far.
    pub fn connect_count(&self, peer: &PeerId) -> usize {
        self.inner
            .connect_counts
            .lock()
            .unwrap()
            .get(peer)
            .copied()
            .unwrap_or(0)
    }

    /// FIND_NODE responses not yet consumed for `peer`.
    pub fn remaining_responses(&self, peer: &PeerId) -> usize {
        self.inner
            .peers
            .lock()
            .unwrap()
            .get(peer)
            .map(|script| script.responses.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    async fn connect(&self, peer: &PeerAddr) -> Result<()> {
        let (delay, outcome) = {
            *self
                .inner
                .connect_counts
                .lock()
                .unwrap()
                .entry(peer.peer_id)
                .or_default() += 1;
            let mut peers = self.inner.peers.lock().unwrap();
            let Some(script) = peers.get_mut(&peer.peer_id) else {
                return Err(Error::ConnectFailed("unknown peer".into()));
            };
            (
                script.connect_delay,
                script.connect_results.pop_front().unwrap_or(Ok(())),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome.map_err(Error::ConnectFailed)
    }

    async fn open_stream(&self, peer: &PeerId, _protocol: &str) -> Result<Box<dyn RequestStream>> {
        let refuse = self
            .inner
            .peers
            .lock()
            .unwrap()
            .get(peer)
            .map(|script| script.fail_stream_open)
            .unwrap_or(true);
        if refuse {
            return Err(Error::StreamOpenFailed("mock refuses stream".into()));
        }
        Ok(Box::new(MockStream {
            peer: *peer,
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn identify_info(&self, peer: &PeerId) -> Option<IdentityInfo> {
        self.inner
            .peers
            .lock()
            .unwrap()
            .get(peer)
            .and_then(|script| script.identity.clone())
    }

    async fn shutdown(&self) {}
}

struct MockStream {
    peer: PeerId,
    inner: Arc<Inner>,
}

#[async_trait]
impl RequestStream for MockStream {
    async fn find_node(&mut self, target: &[u8]) -> Result<Vec<PeerAddr>> {
        assert_eq!(target.len(), 8, "FIND_NODE targets are 8-byte preimages");
        let response = self
            .inner
            .peers
            .lock()
            .unwrap()
            .get_mut(&self.peer)
            .and_then(|script| script.responses.pop_front())
            .unwrap_or(Ok(Vec::new()));
        response.map_err(|err| Error::Protocol(ProtocolError::Io(std::io::Error::other(err))))
    }

    fn protocol(&self) -> &str {
        "/ipfs/kad/1.0.0"
    }
}

/// A worker wired to the given mock endpoint.
pub fn mock_worker(id: usize, endpoint: &Arc<MockEndpoint>) -> Arc<Worker> {
    Arc::new(Worker::new(
        id,
        Arc::clone(endpoint) as Arc<dyn Endpoint>,
        test_preimages(),
        test_worker_config(),
        test_crawler_config(),
        Vec::new(),
    ))
}
