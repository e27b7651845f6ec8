//! CLI commands for `sweep`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sweep_common::{AreaId, Config, Profile};
use sweep_core::job::{InMemoryJobStore, JobStore};
use sweep_core::pipeline::{plan_route, PlanInput};
use sweep_oracle::{CachedOracle, HttpOracle, InMemoryCache, NullOracle, Oracle, SharedOracle};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::geojson_io::{load_streets, write_route};
use crate::worker_loop::WorkerLoop;

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Street-coverage route planner", long_about = None)]
pub struct Cli {
    /// Log output format: "text" or "json".
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan a single coverage route from a GeoJSON street file and print its diagnostics.
    Plan {
        /// GeoJSON FeatureCollection of LineString streets.
        #[arg(short, long)]
        input: PathBuf,

        /// Travel profile: driving-car, driving-hgv, cycling-regular, foot-walking.
        #[arg(long, default_value = "driving-car")]
        profile: String,

        /// Target chunk duration, in seconds.
        #[arg(long, default_value_t = 3600.0)]
        chunk_duration: f64,

        /// Write the assembled route to this GeoJSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL of a routing oracle (ORS-shaped). Falls back to straight
        /// lines when omitted.
        #[arg(long)]
        oracle_url: Option<String>,

        /// Optional TOML config file (overridden further by environment variables).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Enqueue jobs against a fixed street file and drain them with the worker loop.
    Worker {
        /// GeoJSON FeatureCollection of LineString streets, reused for every claimed job.
        #[arg(short, long)]
        input: PathBuf,

        /// Number of jobs to enqueue before starting the loop.
        #[arg(long, default_value_t = 1)]
        jobs: u64,

        /// Travel profile for every enqueued job.
        #[arg(long, default_value = "driving-car")]
        profile: String,

        /// Target chunk duration, in seconds.
        #[arg(long, default_value_t = 3600.0)]
        chunk_duration: f64,

        /// Process whatever is queued, then exit instead of polling forever.
        #[arg(long)]
        once: bool,

        /// Base URL of a routing oracle (ORS-shaped).
        #[arg(long)]
        oracle_url: Option<String>,

        /// Optional TOML config file (overridden further by environment variables).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut cfg = match path {
        Some(path) => Config::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn build_oracle(oracle_url: Option<String>, cfg: &Config) -> SharedOracle {
    match oracle_url {
        Some(url) => Arc::new(CachedOracle::new(HttpOracle::from_config(url, cfg), InMemoryCache::new())),
        None => Arc::new(NullOracle),
    }
}

/// Resolves a `CancellationToken` that fires on Ctrl-C, without blocking the
/// current task — the caller selects on `cancelled()` alongside real work.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        guard.cancel();
    });
    token
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        crate::logging::init_tracing(&self.log_format);
        match self.command {
            Commands::Plan {
                input,
                profile,
                chunk_duration,
                output,
                oracle_url,
                config,
            } => run_plan(input, profile, chunk_duration, output, oracle_url, config).await,
            Commands::Worker {
                input,
                jobs,
                profile,
                chunk_duration,
                once,
                oracle_url,
                config,
            } => run_worker(input, jobs, profile, chunk_duration, once, oracle_url, config).await,
        }
    }
}

async fn run_plan(
    input: PathBuf,
    profile: String,
    chunk_duration: f64,
    output: Option<PathBuf>,
    oracle_url: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let cfg = load_config(config.as_ref())?;
    let profile: Profile = profile.parse().map_err(|e: sweep_common::Error| anyhow::anyhow!(e))?;
    let features = load_streets(&input)?;
    let oracle = build_oracle(oracle_url, &cfg);
    let cancel = shutdown_token();

    let plan_input = PlanInput {
        features,
        center: None,
        profile,
        chunk_duration_s: chunk_duration,
    };

    let route = plan_route(plan_input, &cfg, oracle.as_ref(), &cancel, |stage, percent| {
        println!("[{percent:>3}%] {}", stage.as_str());
    })
    .await?;

    println!(
        "route length: {:.1} m, drive time: {:.0} s, chunks: {}, valid: {}",
        route.length_m,
        route.drive_time_s,
        route.chunks.len(),
        route.valid
    );
    println!(
        "scc_count={} circuits_found={} deadhead_ratio={:.3} components_before={} components_after={} \
         uturn_connections={} oracle_fallbacks={} gap_repairs={}",
        route.diagnostics.scc_count,
        route.diagnostics.circuits_found,
        route.diagnostics.deadhead_ratio,
        route.diagnostics.components_before,
        route.diagnostics.components_after,
        route.diagnostics.uturn_connections,
        route.diagnostics.oracle_fallbacks,
        route.diagnostics.gap_repairs,
    );

    if let Some(output) = output {
        write_route(&route, &output)?;
        println!("wrote {}", output.display());
    }

    Ok(())
}

async fn run_worker(
    input: PathBuf,
    jobs: u64,
    profile: String,
    chunk_duration: f64,
    once: bool,
    oracle_url: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let cfg = load_config(config.as_ref())?;
    let profile: Profile = profile.parse().map_err(|e: sweep_common::Error| anyhow::anyhow!(e))?;
    let features = load_streets(&input)?;
    let oracle = build_oracle(oracle_url, &cfg);
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());

    let mut job_ids = Vec::with_capacity(jobs as usize);
    for _ in 0..jobs {
        job_ids.push(store.enqueue(AreaId(0)).await);
    }

    let build_input = move || PlanInput {
        features: features.clone(),
        center: None,
        profile,
        chunk_duration_s: chunk_duration,
    };

    let worker = WorkerLoop::new(store.clone(), oracle, cfg);
    let cancel = shutdown_token();

    if once {
        while worker.process_one(&build_input, &cancel).await {}
    } else {
        worker.run(&build_input, cancel).await;
    }

    for id in job_ids {
        if let Some(record) = store.get(id).await {
            match &record.diagnostics {
                Some(d) => println!(
                    "job {}: {:?} scc_count={} deadhead_ratio={:.3} oracle_fallbacks={}",
                    id.0, record.status, d.scc_count, d.deadhead_ratio, d.oracle_fallbacks
                ),
                None => println!("job {}: {:?}", id.0, record.status),
            }
        }
    }

    Ok(())
}
