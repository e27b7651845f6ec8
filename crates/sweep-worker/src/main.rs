//! `sweep` — CLI and job-loop binary for the street-coverage route planner.

mod cli;
mod geojson_io;
mod logging;
mod worker_loop;

use anyhow::Result;
use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    Cli::parse().run().await
}
