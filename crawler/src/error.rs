// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Error types for the crawl engine.

use crate::protocol::ProtocolError;
use libp2p::PeerId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crawl engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for crawl operations.
///
/// Per-peer failures (`OnlyLocalAddrs`, `ConnectFailed`, `StreamOpenFailed`,
/// `Protocol`) are recorded against the peer and never terminate the crawl.
/// Everything else is a startup failure and fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration, rejected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The preimage file could not be opened.
    #[error("preimage file {0} missing or unreadable: {1}")]
    PreimageMissing(PathBuf, std::io::Error),

    /// The preimage file contained a line the loader could not accept.
    #[error("malformed preimage file, line {line}: {reason}")]
    PreimageMalformed { line: usize, reason: String },

    /// The preimage file did not cover the full prefix space.
    #[error("incomplete preimage file: {populated} of {expected} prefixes populated")]
    PreimageIncomplete { populated: usize, expected: usize },

    /// The peer advertises no address we could ever dial.
    #[error("peer {0} advertises only loopback or private addresses")]
    OnlyLocalAddrs(PeerId),

    /// Every connection attempt to the peer failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Connected, but no request substream could be negotiated.
    #[error("stream open failed: {0}")]
    StreamOpenFailed(String),

    /// A wire-level failure during the bucket sweep.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Requested a common prefix length outside the precomputed space.
    /// This is a programmer bug, not a runtime condition.
    #[error("common prefix length {0} out of range (max {1})")]
    CplOutOfRange(u32, u32),

    /// Generic I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error on reports or caches.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Channel communication error.
    #[error("channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Coarse class of this error, used for the end-of-crawl tally.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::PreimageMissing(..) => "preimage_missing",
            Error::PreimageMalformed { .. } => "preimage_malformed",
            Error::PreimageIncomplete { .. } => "preimage_incomplete",
            Error::OnlyLocalAddrs(_) => "only_local_addrs",
            Error::ConnectFailed(_) => "connect_failed",
            Error::StreamOpenFailed(_) => "stream_open_failed",
            Error::Protocol(_) => "protocol",
            Error::CplOutOfRange(..) => "cpl_out_of_range",
            Error::Io(_) => "io",
            Error::Serde(_) => "serde",
            Error::Channel(_) => "channel",
        }
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(err: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::Channel(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}
