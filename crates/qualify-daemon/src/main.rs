//! qualifyd - Championship qualification mutation worker
//!
//! Runs the single background worker that applies ledger mutations to the
//! participant registry. Mutations appended by other processes are picked
//! up on the next poll.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qualify_core::{MutationProcessor, QualifyConfig, Store};
use qualify_daemon::signal::WakeSignal;
use qualify_daemon::worker::{MutationWorker, ShutdownHandle, WorkerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// qualifyd - championship qualification mutation worker
#[derive(Parser, Debug)]
#[command(name = "qualifyd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides `[store] path`)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Checkpoint name (overrides `[worker] name`)
    #[arg(long)]
    worker_name: Option<String>,

    /// Re-examine the whole ledger from sequence id 0
    #[arg(long)]
    rescan: bool,

    /// Stop after this many seconds (overrides `[worker] run_for_secs`)
    #[arg(long)]
    run_for: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<QualifyConfig> {
    let mut config = match &args.config {
        Some(path) => QualifyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => QualifyConfig::default(),
    };
    if let Some(db) = &args.db {
        config.store.path.clone_from(db);
    }
    if let Some(name) = &args.worker_name {
        config.worker.name.clone_from(name);
    }
    if args.run_for.is_some() {
        config.worker.run_for_secs = args.run_for;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[cfg(unix)]
fn spawn_signal_task(shutdown: ShutdownHandle) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
        shutdown.shutdown();
    }))
}

#[cfg(not(unix))]
fn spawn_signal_task(shutdown: ShutdownHandle) -> Result<tokio::task::JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
        }
        shutdown.shutdown();
    }))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;
    let config = load_config(&args)?;

    let store = Store::open(&config.store.path)
        .with_context(|| format!("failed to open store {}", config.store.path.display()))?
        .with_default_cut_limit(config.ranking.default_cut_limit);
    info!(
        db = %config.store.path.display(),
        default_cut_limit = store.default_cut_limit(),
        "store opened"
    );

    let processor = Arc::new(
        MutationProcessor::new(&store, config.worker.name.clone())
            .context("failed to create mutation processor")?,
    );
    let signal = Arc::new(WakeSignal::new());
    let worker_config = WorkerConfig::from_config(&config).with_rescan(args.rescan);
    let mut worker = MutationWorker::new(processor, signal, worker_config);

    let signal_task = spawn_signal_task(worker.shutdown_handle())?;
    let stats = worker.run().await.context("mutation worker failed")?;
    signal_task.abort();

    info!(
        applied = stats.applied,
        failed_scans = stats.failed_scans,
        "qualifyd exiting"
    );
    Ok(())
}
