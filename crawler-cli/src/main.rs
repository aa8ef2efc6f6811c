// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Run a crawl of the public IPFS DHT and write the report files.

use clap::Parser;
use dht_crawler::{
    addr::parse_peer_string,
    report::{self, CrawlReport},
    transport::libp2p::Libp2pEndpoint,
    CrawlConfig, CrawlManager, Error, PeerAddr, PreimageTable, Result, Worker,
};
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Timestamp tag used in output file names.
const FILENAME_TIME_FORMAT: &str = "%d-%m-%y--%H-%M-%S";

#[derive(Debug, Parser)]
#[command(name = "dht-crawler", version, about = "Crawl the IPFS/libp2p public DHT")]
struct Opt {
    /// Path to a JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source of the precomputed preimage table (.csv or .csv.zst).
    #[arg(long)]
    preimage_file: Option<PathBuf>,

    /// Directory the report and peer graph are written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Bootstrap peer multiaddr (with /p2p/…); may be given repeatedly.
    #[arg(long = "bootstrap-peer")]
    bootstrap_peers: Vec<String>,

    /// File of bootstrap multiaddrs, one per line, `//` comments out.
    #[arg(long)]
    bootstrap_file: Option<PathBuf>,

    /// Node cache: seeds this crawl and is rewritten afterwards.
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Canary peers checked against the finished report.
    #[arg(long)]
    canary_file: Option<PathBuf>,

    /// Number of overlay endpoints to crawl with.
    #[arg(long)]
    num_workers: Option<usize>,

    /// Upper bound on simultaneously outstanding probes.
    #[arg(long)]
    concurrent_requests: Option<usize>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to this path and continue.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt = Opt::parse();
    init_logging(&opt.log_level);

    match run(opt).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dht_crawler={level},dht_crawler_cli={level},libp2p=warn"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(opt: Opt) -> Result<()> {
    let config = build_config(&opt)?;
    config.validate()?;

    if let Some(path) = &opt.save_config {
        fs::write(path, serde_json::to_string_pretty(&config)?)?;
        info!(path = %path.display(), "effective configuration saved");
    }

    info!(path = %config.preimage_file_path.display(), "loading pre-images, this can take a moment");
    let preimages = Arc::new(PreimageTable::load(&config.preimage_file_path)?);
    info!("pre-images loaded");

    let seeds = gather_seeds(&config)?;
    if seeds.is_empty() {
        warn!("no usable seed peers; the report will be empty");
    }

    let mut workers = Vec::with_capacity(config.num_workers);
    for id in 0..config.num_workers {
        let endpoint = Arc::new(Libp2pEndpoint::spawn(&config.worker_config.user_agent)?);
        workers.push(Arc::new(Worker::new(
            id,
            endpoint,
            Arc::clone(&preimages),
            config.worker_config.clone(),
            config.crawler_config.clone(),
            Vec::new(),
        )));
    }

    let manager = CrawlManager::new(workers.clone(), config.concurrent_requests);
    let report = manager.crawl(seeds).await;

    write_outputs(&config, &report)?;

    if let Some(canary_path) = &config.canary_file_path {
        check_canaries(&report, canary_path);
    }

    for worker in &workers {
        worker.stop().await;
    }

    Ok(())
}

/// Load the config file (if any) and fold the command-line flags in.
fn build_config(opt: &Opt) -> Result<CrawlConfig> {
    let mut config = match &opt.config {
        Some(path) => {
            let data = fs::read_to_string(path)
                .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
            serde_json::from_str(&data)
                .map_err(|err| Error::Config(format!("cannot parse {}: {err}", path.display())))?
        }
        None => CrawlConfig::default(),
    };

    if let Some(path) = &opt.preimage_file {
        config.preimage_file_path = path.clone();
    }
    if let Some(path) = &opt.output_dir {
        config.output_directory_path = path.clone();
    }
    if !opt.bootstrap_peers.is_empty() {
        config.bootstrap_peers = opt.bootstrap_peers.clone();
    }
    if let Some(path) = &opt.bootstrap_file {
        config.bootstrap_file_path = Some(path.clone());
    }
    if let Some(path) = &opt.cache_file {
        config.cache_file_path = Some(path.clone());
    }
    if let Some(path) = &opt.canary_file {
        config.canary_file_path = Some(path.clone());
    }
    if let Some(num) = opt.num_workers {
        config.num_workers = num;
    }
    if let Some(num) = opt.concurrent_requests {
        config.concurrent_requests = num;
    }

    Ok(config)
}

/// Union of configured bootstrap peers, bootstrap file and node cache.
fn gather_seeds(config: &CrawlConfig) -> Result<Vec<PeerAddr>> {
    let mut seeds = Vec::new();

    for text in &config.bootstrap_peers {
        seeds.push(parse_peer_string(text)?);
    }

    if let Some(path) = &config.bootstrap_file_path {
        seeds.extend(load_bootstrap_file(path)?);
    }

    if let Some(path) = &config.cache_file_path {
        match report::restore_node_cache(path) {
            Ok(cached) => {
                info!(peers = cached.len(), path = %path.display(), "seeding from node cache");
                seeds.extend(cached);
            }
            Err(err) => {
                // A missing or stale cache is normal on the first run.
                warn!(%err, path = %path.display(), "could not restore node cache");
            }
        }
    }

    Ok(seeds)
}

/// One multiaddr per line; lines starting with `//` are comments.
fn load_bootstrap_file(path: &Path) -> Result<Vec<PeerAddr>> {
    let data = fs::read_to_string(path)
        .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;

    let mut peers = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        peers.push(parse_peer_string(line)?);
    }
    Ok(peers)
}

fn write_outputs(config: &CrawlConfig, report: &CrawlReport) -> Result<()> {
    let start_tag = report.start_timestamp.format(FILENAME_TIME_FORMAT);
    let end_tag = report.end_timestamp.format(FILENAME_TIME_FORMAT);
    let out_dir = &config.output_directory_path;

    report::write_json_report(
        report,
        &out_dir.join(format!("visited_peers_{start_tag}_{end_tag}.json")),
    )?;
    report::write_peer_graph(
        report,
        &out_dir.join(format!("peer_graph_{start_tag}_{end_tag}.csv")),
    )?;

    if let Some(cache_path) = &config.cache_file_path {
        report::save_node_cache(report, cache_path)?;
    }

    Ok(())
}

/// Sanity check: warn about every canary peer the crawl did not reach.
fn check_canaries(report: &CrawlReport, path: &Path) {
    let canaries = match load_bootstrap_file(path) {
        Ok(canaries) => canaries,
        Err(err) => {
            warn!(%err, path = %path.display(), "cannot read canary file");
            return;
        }
    };

    for canary in canaries {
        match report
            .found_nodes
            .iter()
            .find(|node| node.id == canary.peer_id)
        {
            None => warn!(peer = %canary.peer_id, "canary was never observed"),
            Some(node) if !node.crawlable() => {
                warn!(peer = %canary.peer_id, "canary observed but not crawlable");
            }
            Some(_) => info!(peer = %canary.peer_id, "canary crawled"),
        }
    }
}
