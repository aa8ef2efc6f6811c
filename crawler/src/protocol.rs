// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The Kademlia DHT wire protocol: protobuf messages with an
//! unsigned-varint length prefix, as spoken on `/ipfs/kad/1.0.0`.
//!
//! Only the FIND_NODE exchange is implemented; the crawler never stores
//! or serves records.

use crate::addr::PeerAddr;
use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use libp2p::{Multiaddr, PeerId};
use prost::Message as _;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a single wire message, matching go-libp2p's
/// `network.MessageSizeMax` of 4 MiB.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Wire-level failures during a request/response exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("length prefix: {0}")]
    Varint(#[from] unsigned_varint::io::ReadError),

    #[error("decode: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit")]
    MessageTooLarge(usize),

    #[error("expected a FIND_NODE response, got message type {0}")]
    UnexpectedMessageType(i32),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// DHT message types, mirroring the protobuf `MessageType` enum of
/// go-libp2p-kad-dht.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    PutValue = 0,
    GetValue = 1,
    AddProvider = 2,
    GetProviders = 3,
    FindNode = 4,
    Ping = 5,
}

/// How the responder relates to a peer it reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ConnectionType {
    /// Sender hasn't tried to connect to the peer.
    NotConnected = 0,
    /// Sender is currently connected to the peer.
    Connected = 1,
    /// Sender was recently connected to the peer.
    CanConnect = 2,
    /// Sender tried to connect to the peer but failed.
    CannotConnect = 3,
}

/// A peer as reported in a `closerPeers` list.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WirePeer {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
    #[prost(enumeration = "ConnectionType", tag = "3")]
    pub connection: i32,
}

/// The DHT protobuf message. Field numbers are fixed by the upstream
/// schema; unknown fields from remotes are skipped by prost.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireMessage {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(message, repeated, tag = "8")]
    pub closer_peers: Vec<WirePeer>,
    #[prost(message, repeated, tag = "9")]
    pub provider_peers: Vec<WirePeer>,
    #[prost(int32, tag = "10")]
    pub cluster_level_raw: i32,
}

impl WireMessage {
    /// A FIND_NODE request for `target`, cluster level zero.
    pub fn find_node(target: &[u8]) -> Self {
        Self {
            r#type: MessageType::FindNode as i32,
            key: target.to_vec(),
            closer_peers: Vec::new(),
            provider_peers: Vec::new(),
            cluster_level_raw: 0,
        }
    }

    /// The `closerPeers` list as typed peer addresses.
    ///
    /// Entries with an undecodable peer id are dropped; undecodable
    /// addresses are dropped per entry. Remotes do send garbage.
    pub fn closer_peers(&self) -> Vec<PeerAddr> {
        self.closer_peers
            .iter()
            .filter_map(|peer| {
                let peer_id = match PeerId::from_bytes(&peer.id) {
                    Ok(id) => id,
                    Err(err) => {
                        debug!(?err, "dropping closer peer with invalid id");
                        return None;
                    }
                };
                let addrs = peer
                    .addrs
                    .iter()
                    .filter_map(|bytes| Multiaddr::try_from(bytes.clone()).ok())
                    .collect();
                Some(PeerAddr::new(peer_id, addrs))
            })
            .collect()
    }
}

/// Write one varint-length-prefixed message.
pub async fn write_message<W>(io: &mut W, message: &WireMessage) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + Send,
{
    let payload = message.encode_to_vec();
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(payload.len()));
    }

    let mut len_buf = unsigned_varint::encode::usize_buffer();
    io.write_all(unsigned_varint::encode::usize(payload.len(), &mut len_buf))
        .await?;
    io.write_all(&payload).await?;
    io.flush().await?;
    Ok(())
}

/// Read one varint-length-prefixed message.
pub async fn read_message<R>(io: &mut R) -> Result<WireMessage, ProtocolError>
where
    R: AsyncRead + Unpin + Send,
{
    let len = unsigned_varint::aio::read_usize(&mut *io).await?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await?;
    Ok(WireMessage::decode(payload.as_slice())?)
}
