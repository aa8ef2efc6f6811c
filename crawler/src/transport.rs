// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Transport abstraction for peer probes.
//!
//! The worker only needs three things from an overlay endpoint: dial a
//! peer, open a request substream, and report what the remote said about
//! itself. Keeping that behind a trait lets the whole crawl engine run
//! against a scripted in-memory endpoint in tests.

pub mod libp2p;

use crate::{addr::PeerAddr, Result};
use ::libp2p::PeerId;
use async_trait::async_trait;

/// What a remote advertised about itself via the identify protocol.
#[derive(Debug, Clone, Default)]
pub struct IdentityInfo {
    pub agent_version: Option<String>,
    pub protocols: Vec<String>,
}

/// An open request substream to one remote.
///
/// All exchanges of a bucket sweep reuse a single stream; the remote
/// answers in FIFO order, so one request must be read to completion
/// before the next is written.
#[async_trait]
pub trait RequestStream: Send {
    /// Send a FIND_NODE for `target` and read the single response.
    async fn find_node(&mut self, target: &[u8]) -> Result<Vec<PeerAddr>>;

    /// The protocol identifier this stream was negotiated with.
    fn protocol(&self) -> &str;
}

/// One overlay endpoint: a networking identity plus its connections.
///
/// Endpoints are owned by exactly one worker but may serve several
/// concurrent probes; the underlying implementation multiplexes
/// connections.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// The identity this endpoint dials out with.
    fn local_peer_id(&self) -> PeerId;

    /// One connection attempt to the peer over its known addresses.
    /// The caller bounds this with its own deadline and retry loop.
    async fn connect(&self, peer: &PeerAddr) -> Result<()>;

    /// Negotiate a request substream with an already-connected peer.
    async fn open_stream(&self, peer: &PeerId, protocol: &str)
        -> Result<Box<dyn RequestStream>>;

    /// Identify data collected for the peer, if any arrived yet.
    async fn identify_info(&self, peer: &PeerId) -> Option<IdentityInfo>;

    /// Close the endpoint, interrupting any outstanding I/O.
    async fn shutdown(&self);
}
