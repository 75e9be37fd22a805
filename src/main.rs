use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use transcode_worker::db::JobCatalog;
use transcode_worker::error::Result;
use transcode_worker::job_runner::Supervisor;
use transcode_worker::profile::default_preset;
use transcode_worker::signal::{watch_for_shutdown, ShutdownBroadcast};
use transcode_worker::WorkerConfig;

/// Long-running worker process: polls the job catalog for queued work and
/// keeps up to `concurrency` transcode pipelines in flight, exactly like any
/// other interchangeable worker in the fleet.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file; falls back to built-in defaults if absent.
    #[arg(long, default_value = "worker.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("worker exited with error: {e}");
            Err(e)
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = WorkerConfig::load(&args.config)?;

    info!(concurrency = config.concurrency, "starting transcode worker");

    let catalog = Arc::new(JobCatalog::connect(&config.database_url).await?);
    let shutdown = ShutdownBroadcast::new();

    let shutdown_watcher = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = watch_for_shutdown(shutdown_watcher).await {
            error!("shutdown watcher failed: {e}");
        }
    });

    // TODO(preset-catalog): select the preset per job from `job.preset` once
    // a preset catalog table exists; the built-in ladder covers every job today.
    let supervisor = Supervisor::new(catalog, config, default_preset(), shutdown);
    supervisor.run().await?;

    info!("transcode worker shut down cleanly");
    Ok(())
}
