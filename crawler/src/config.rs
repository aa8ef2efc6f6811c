// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Crawl configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Default Kademlia protocol identifiers, in descending preference.
pub const DEFAULT_PROTOCOL_STRINGS: &[&str] = &["/ipfs/kad/1.0.0", "/ipfs/kad/2.0.0"];

fn default_num_workers() -> usize {
    1
}

fn default_concurrent_requests() -> usize {
    500
}

fn default_connect_timeout_secs() -> u64 {
    45
}

fn default_connection_attempts() -> u32 {
    3
}

fn default_desync_millis() -> u64 {
    500
}

fn default_user_agent() -> String {
    concat!("dht-crawler/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_protocol_strings() -> Vec<String> {
    DEFAULT_PROTOCOL_STRINGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_interaction_timeout_secs() -> u64 {
    15
}

fn default_interaction_attempts() -> u32 {
    1
}

/// Per-endpoint options: how a worker dials and identifies itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Deadline for a single connection attempt, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How many times to retry the dial before giving up on a peer.
    #[serde(default = "default_connection_attempts")]
    pub connection_attempts: u32,
    /// Agent string advertised over identify.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on the random pre-probe sleep that decorrelates
    /// parallel workers. Zero disables the sleep.
    #[serde(default = "default_desync_millis")]
    pub desync_millis: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            connection_attempts: default_connection_attempts(),
            user_agent: default_user_agent(),
            desync_millis: default_desync_millis(),
        }
    }
}

impl WorkerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn check(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config("missing connection timeout".into()));
        }
        if self.connection_attempts == 0 {
            return Err(Error::Config(
                "invalid or missing connection attempts".into(),
            ));
        }
        if self.user_agent.is_empty() {
            return Err(Error::Config("missing user agent".into()));
        }
        Ok(())
    }
}

/// Bucket-sweep options: which protocols to speak and how patiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Kademlia protocol identifiers, in descending preference.
    #[serde(default = "default_protocol_strings")]
    pub protocol_strings: Vec<String>,
    /// Deadline for a single request/response exchange, in seconds.
    #[serde(default = "default_interaction_timeout_secs")]
    pub interaction_timeout_secs: u64,
    /// How many times to retry a failed exchange.
    #[serde(default = "default_interaction_attempts")]
    pub interaction_attempts: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            protocol_strings: default_protocol_strings(),
            interaction_timeout_secs: default_interaction_timeout_secs(),
            interaction_attempts: default_interaction_attempts(),
        }
    }
}

impl CrawlerConfig {
    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_secs(self.interaction_timeout_secs)
    }

    fn check(&self) -> Result<()> {
        if self.protocol_strings.is_empty() {
            return Err(Error::Config("no kademlia protocol strings".into()));
        }
        if self.interaction_timeout_secs == 0 {
            return Err(Error::Config("missing interaction timeout".into()));
        }
        if self.interaction_attempts == 0 {
            return Err(Error::Config(
                "invalid or missing interaction attempts".into(),
            ));
        }
        Ok(())
    }
}

/// The full crawl configuration, as read from the config file and
/// amended by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Source of the precomputed preimage table.
    pub preimage_file_path: PathBuf,
    /// Where reports and the peer graph are written.
    pub output_directory_path: PathBuf,
    /// Number of overlay endpoints (libp2p hosts) to crawl with.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Upper bound on simultaneously outstanding probes.
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
    /// Bootstrap peers as multiaddr strings with a /p2p component.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Optional file of bootstrap multiaddrs, one per line, `//` comments.
    #[serde(default)]
    pub bootstrap_file_path: Option<PathBuf>,
    /// Optional node cache: seeds this crawl, rewritten afterwards.
    #[serde(default)]
    pub cache_file_path: Option<PathBuf>,
    /// Optional canary file checked against the finished report.
    #[serde(default)]
    pub canary_file_path: Option<PathBuf>,
    #[serde(default)]
    pub worker_config: WorkerConfig,
    #[serde(default)]
    pub crawler_config: CrawlerConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            preimage_file_path: PathBuf::new(),
            output_directory_path: PathBuf::new(),
            num_workers: default_num_workers(),
            concurrent_requests: default_concurrent_requests(),
            bootstrap_peers: Vec::new(),
            bootstrap_file_path: None,
            cache_file_path: None,
            canary_file_path: None,
            worker_config: WorkerConfig::default(),
            crawler_config: CrawlerConfig::default(),
        }
    }
}

impl CrawlConfig {
    /// Validate the configuration; any violation is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be at least 1".into()));
        }
        if self.concurrent_requests < self.num_workers {
            return Err(Error::Config(
                "concurrent_requests must be at least num_workers".into(),
            ));
        }
        if self.preimage_file_path.as_os_str().is_empty() {
            return Err(Error::Config("missing preimage file path".into()));
        }
        if self.output_directory_path.as_os_str().is_empty() {
            return Err(Error::Config("missing output directory path".into()));
        }
        if self.bootstrap_peers.is_empty()
            && self.bootstrap_file_path.is_none()
            && self.cache_file_path.is_none()
        {
            return Err(Error::Config(
                "no bootstrap peers, bootstrap file or node cache configured".into(),
            ));
        }
        self.worker_config.check()?;
        self.crawler_config.check()?;
        Ok(())
    }
}
