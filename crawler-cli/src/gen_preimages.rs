// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Offline preimage generation. Run once; the crawler loads the result
//! at every startup.

use clap::Parser;
use dht_crawler::preimage;
use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "gen-preimages",
    version,
    about = "Precompute the FIND_NODE preimage table"
)]
struct Opt {
    /// Output file, in the format the crawler loads.
    #[arg(long, default_value = "preimages.csv")]
    out: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();
    match run(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(opt: &Opt) -> dht_crawler::Result<()> {
    info!(out = %opt.out.display(), "generating preimages, this takes a few minutes");
    let file = File::create(&opt.out)?;
    preimage::generate(BufWriter::new(file))?;
    info!(out = %opt.out.display(), "preimage table complete");
    Ok(())
}
