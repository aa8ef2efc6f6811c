// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Crawl output: the report snapshot, its JSON and CSV writers, and the
//! node cache consumed as seeds by the next crawl.

use crate::{
    addr::PeerAddr,
    frontier::{PeerPhase, PeerState},
    plugin::PluginOutcome,
    Result,
};
use atomic_write_file::AtomicWriteFile;
use chrono::{DateTime, Utc};
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    io::Write,
    path::Path,
};

/// Snapshot of everything a crawl learned, produced at termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub found_nodes: Vec<NodeRecord>,
}

/// One observed peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: PeerId,
    pub multiaddrs: Vec<Multiaddr>,
    /// Present iff the connect phase failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connection_error: Option<String>,
    /// Present iff the connect phase succeeded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<NodeCrawlResult>,
    /// Edges of the peer graph; materialized into the CSV, not the JSON.
    #[serde(skip, default)]
    pub neighbors: Vec<PeerId>,
}

impl NodeRecord {
    /// Whether the peer's full bucket sweep succeeded.
    pub fn crawlable(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|result| result.crawl_error.is_none())
    }
}

/// What a connected peer yielded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCrawlResult {
    pub agent_version: Option<String>,
    pub supported_protocols: Vec<String>,
    pub crawl_begin_ts: DateTime<Utc>,
    pub crawl_end_ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub crawl_error: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub plugin_data: BTreeMap<String, PluginOutcome>,
}

impl CrawlReport {
    /// Materialize the report from the state store, ordered by peer id
    /// so output files diff cleanly between runs.
    pub fn from_states(
        start_timestamp: DateTime<Utc>,
        end_timestamp: DateTime<Utc>,
        states: HashMap<PeerId, PeerState>,
    ) -> Self {
        let mut found_nodes: Vec<NodeRecord> = states
            .into_iter()
            .map(|(id, state)| {
                let result = match (state.phase, state.crawl_begin_ts, state.crawl_end_ts) {
                    (PeerPhase::DoneOk | PeerPhase::DoneCrawlFail, Some(begin), Some(end)) => {
                        Some(NodeCrawlResult {
                            agent_version: state.agent_version,
                            supported_protocols: state.supported_protocols,
                            crawl_begin_ts: begin,
                            crawl_end_ts: end,
                            crawl_error: if state.phase == PeerPhase::DoneCrawlFail {
                                state.last_err.clone()
                            } else {
                                None
                            },
                            plugin_data: state.plugin_data,
                        })
                    }
                    _ => None,
                };
                let connection_error = if state.phase == PeerPhase::DoneConnectFail {
                    state.last_err
                } else {
                    None
                };
                NodeRecord {
                    id,
                    multiaddrs: state.addrs,
                    connection_error,
                    result,
                    neighbors: state.neighbors,
                }
            })
            .collect();
        found_nodes.sort_by_key(|node| node.id.to_bytes());

        Self {
            start_timestamp,
            end_timestamp,
            found_nodes,
        }
    }
}

fn atomic_writer(path: &Path) -> Result<AtomicWriteFile> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(AtomicWriteFile::options().open(path)?)
}

/// Write the report as JSON.
pub fn write_json_report(report: &CrawlReport, path: &Path) -> Result<()> {
    let mut file = atomic_writer(path)?;
    serde_json::to_writer_pretty(&mut file, report)?;
    writeln!(file)?;
    file.commit()?;
    info!(path = %path.display(), nodes = report.found_nodes.len(), "report written");
    Ok(())
}

/// Write the peer graph: one row per directed edge from a crawled peer
/// to each neighbor it reported.
pub fn write_peer_graph(report: &CrawlReport, path: &Path) -> Result<()> {
    let crawlable: HashSet<&PeerId> = report
        .found_nodes
        .iter()
        .filter(|node| node.crawlable())
        .map(|node| &node.id)
        .collect();

    let mut file = atomic_writer(path)?;
    writeln!(file, "source,target,target_crawlable,source_crawl_timestamp")?;
    let mut edges = 0usize;
    for node in &report.found_nodes {
        let Some(result) = &node.result else {
            continue;
        };
        let timestamp = result.crawl_end_ts.to_rfc3339();
        for neighbor in &node.neighbors {
            writeln!(
                file,
                "{},{},{},{}",
                node.id,
                neighbor,
                crawlable.contains(neighbor),
                timestamp
            )?;
            edges += 1;
        }
    }
    file.commit()?;
    info!(path = %path.display(), edges, "peer graph written");
    Ok(())
}

/// A cached peer, fed verbatim into the next crawl's seed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedNode {
    id: PeerId,
    multiaddrs: Vec<Multiaddr>,
}

/// Save the peers whose sweep fully succeeded. Seeding the next crawl
/// with them skips the slow frontier ramp-up from the bootstrap peers.
pub fn save_node_cache(report: &CrawlReport, path: &Path) -> Result<()> {
    let nodes: Vec<CachedNode> = report
        .found_nodes
        .iter()
        .filter(|node| node.crawlable())
        .map(|node| CachedNode {
            id: node.id,
            multiaddrs: node.multiaddrs.clone(),
        })
        .collect();

    let mut file = atomic_writer(path)?;
    serde_json::to_writer(&mut file, &nodes)?;
    writeln!(file)?;
    file.commit()?;
    info!(path = %path.display(), nodes = nodes.len(), "node cache written");
    Ok(())
}

/// Load a node cache written by a previous crawl.
pub fn restore_node_cache(path: &Path) -> Result<Vec<PeerAddr>> {
    let data = fs::read_to_string(path)?;
    let nodes: Vec<CachedNode> = serde_json::from_str(&data)?;
    Ok(nodes
        .into_iter()
        .map(|node| PeerAddr::new(node.id, node.multiaddrs))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::Frontier;
    use crate::worker::RawNodeInfo;
    use crate::Error;

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    /// A report with one crawled peer (knowing one neighbor), one
    /// crawl-failed peer and one unreachable peer.
    fn sample_report() -> (CrawlReport, PeerId, PeerId, PeerId) {
        let mut frontier = Frontier::new();
        let ok = PeerAddr::new(PeerId::random(), vec![ma("/ip4/1.1.1.1/tcp/4001")]);
        let partial = PeerAddr::new(PeerId::random(), vec![ma("/ip4/2.2.2.2/tcp/4001")]);
        let dead = PeerAddr::new(PeerId::random(), vec![ma("/ip4/3.3.3.3/tcp/4001")]);

        for peer in [&ok, &partial, &dead] {
            frontier.observe(peer);
            frontier.pop().unwrap();
            frontier.mark_in_flight(&peer.peer_id);
        }

        frontier.complete_connected(
            &ok.peer_id,
            RawNodeInfo {
                neighbors: vec![partial.clone()],
                agent_version: Some("kubo/0.32.0".into()),
                supported_protocols: vec!["/ipfs/kad/1.0.0".into()],
                begin_ts: Utc::now(),
                end_ts: Utc::now(),
                crawl_error: None,
                plugin_data: BTreeMap::new(),
            },
        );
        frontier.complete_connected(
            &partial.peer_id,
            RawNodeInfo {
                neighbors: Vec::new(),
                agent_version: None,
                supported_protocols: Vec::new(),
                begin_ts: Utc::now(),
                end_ts: Utc::now(),
                crawl_error: Some(Error::StreamOpenFailed("reset".into())),
                plugin_data: BTreeMap::new(),
            },
        );
        frontier.complete_connect_failed(
            &dead.peer_id,
            &Error::ConnectFailed("connection refused".into()),
        );

        let report = CrawlReport::from_states(Utc::now(), Utc::now(), frontier.into_states());
        (report, ok.peer_id, partial.peer_id, dead.peer_id)
    }

    #[test]
    fn json_shape_matches_the_contract() {
        let (report, ok, partial, dead) = sample_report();
        let value = serde_json::to_value(&report).unwrap();

        assert!(value.get("start_timestamp").is_some());
        assert!(value.get("end_timestamp").is_some());
        let nodes = value["found_nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 3);

        for node in nodes {
            let id = node["id"].as_str().unwrap();
            if id == ok.to_string() {
                assert!(node.get("connection_error").is_none());
                let result = &node["result"];
                assert_eq!(result["agent_version"], "kubo/0.32.0");
                assert!(result.get("crawl_error").is_none());
                assert!(result.get("crawl_begin_ts").is_some());
                // Neighbors belong to the CSV, not the JSON.
                assert!(node.get("neighbors").is_none());
            } else if id == partial.to_string() {
                assert!(node.get("connection_error").is_none());
                assert_eq!(node["result"]["crawl_error"], "stream open failed: reset");
            } else if id == dead.to_string() {
                assert!(node.get("result").is_none());
                assert_eq!(
                    node["connection_error"],
                    "connect failed: connection refused"
                );
            } else {
                panic!("unexpected node {id}");
            }
        }
    }

    #[test]
    fn peer_graph_lists_edges_with_crawlability() {
        let (report, ok, partial, _) = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peer_graph.csv");
        write_peer_graph(&report, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "source,target,target_crawlable,source_crawl_timestamp"
        );
        let edge = lines.next().unwrap();
        assert!(edge.starts_with(&format!("{ok},{partial},false,")));
        assert!(lines.next().is_none());
    }

    #[test]
    fn node_cache_round_trips_crawlable_peers_only() {
        let (report, ok, _, _) = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.cache");

        save_node_cache(&report, &path).unwrap();
        let restored = restore_node_cache(&path).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].peer_id, ok);
        assert_eq!(restored[0].addrs, vec![ma("/ip4/1.1.1.1/tcp/4001")]);
    }

    #[test]
    fn report_json_round_trips() {
        let (report, _, _, _) = sample_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_report(&report, &path).unwrap();

        let parsed: CrawlReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.found_nodes.len(), report.found_nodes.len());
    }
}
