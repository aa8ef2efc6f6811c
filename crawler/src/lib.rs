// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Crawl engine for the IPFS/libp2p public Kademlia DHT.
//!
//! Starting from a handful of bootstrap peers, the crawler probes every
//! peer it hears about, extracts each remote's reachable routing table
//! with a preimage-steered FIND_NODE sweep, and records the observed
//! adjacency as a directed peer graph.
//!
//! The moving parts:
//!
//! - [`preimage::PreimageTable`] — answers "give me a value whose key
//!   shares `k` leading bits with peer `P`", which is what lets one
//!   stream read out a remote's entire routing table.
//! - [`worker::Worker`] — owns one overlay endpoint and runs single
//!   probes end to end.
//! - [`frontier::Frontier`] — the to-crawl queue and per-peer state.
//! - [`manager::CrawlManager`] — the dispatch loop tying it together
//!   under a fixed concurrency budget.
//!
//! The crawler is not a DHT participant: it publishes nothing, stores
//! nothing and serves nothing.

#[macro_use]
extern crate tracing;

pub mod addr;
pub mod config;
pub mod error;
pub mod frontier;
pub mod manager;
pub mod plugin;
pub mod preimage;
pub mod protocol;
pub mod report;
pub mod transport;
pub mod worker;

pub use addr::PeerAddr;
pub use config::{CrawlConfig, CrawlerConfig, WorkerConfig};
pub use error::{Error, Result};
pub use manager::CrawlManager;
pub use preimage::PreimageTable;
pub use report::CrawlReport;
pub use worker::{RawNodeInfo, Worker};
