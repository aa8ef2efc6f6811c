// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The per-peer measurement plugin surface.
//!
//! Plugins run against peers the crawler has an open connection to and
//! contribute arbitrary JSON to the report, keyed by plugin name.

use crate::{addr::PeerAddr, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A measurement to run against every connected peer.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name of the plugin; keys its output in the report.
    fn name(&self) -> &str;

    /// Measure the given peer. The endpoint holds an open connection to
    /// it while this runs. The returned value is embedded verbatim in
    /// the peer's report record.
    async fn handle_peer(&self, peer: &PeerAddr) -> Result<serde_json::Value>;

    /// Release any resources the plugin holds.
    async fn shutdown(&self) -> Result<()>;
}

/// What a plugin produced for one peer: a value, or an error string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginOutcome {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            result: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn success_carries_the_value_and_no_error() {
        let outcome = PluginOutcome::success(serde_json::json!({ "latency_ms": 12 }));
        assert_eq!(outcome.result, Some(serde_json::json!({ "latency_ms": 12 })));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn failure_carries_the_error_string_and_no_value() {
        let outcome = PluginOutcome::failure(Error::StreamOpenFailed("reset".into()));
        assert!(outcome.result.is_none());
        assert_eq!(outcome.error.as_deref(), Some("stream open failed: reset"));
    }

    #[test]
    fn serialized_outcome_omits_the_absent_side() {
        let success = serde_json::to_value(PluginOutcome::success(serde_json::json!(1))).unwrap();
        assert_eq!(success, serde_json::json!({ "result": 1 }));

        let failure = serde_json::to_value(PluginOutcome::failure("boom")).unwrap();
        assert_eq!(failure, serde_json::json!({ "error": "boom" }));
    }
}

