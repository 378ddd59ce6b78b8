//! Background worker applying ledger mutations.
//!
//! The worker is the single consumer of the mutation ledger. It scans when
//! the dispatcher pings the [`WakeSignal`] or when the ledger head moved
//! past its checkpoint, and otherwise sleeps for the poll interval. The
//! actual `SQLite` work runs on the blocking thread pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use qualify_core::{MutationProcessor, Store};
//! use qualify_daemon::signal::WakeSignal;
//! use qualify_daemon::worker::{MutationWorker, WorkerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Store::open("qualify.db")?;
//! let processor = Arc::new(MutationProcessor::new(&store, "championship-mutations")?);
//! let signal = Arc::new(WakeSignal::new());
//! let config = WorkerConfig::default().with_poll_interval(Duration::from_millis(500));
//!
//! let mut worker = MutationWorker::new(processor, signal, config);
//! let shutdown = worker.shutdown_handle();
//! tokio::spawn(async move { worker.run().await });
//! // ...
//! shutdown.shutdown();
//! # Ok(())
//! # }
//! ```

// Durations in milliseconds won't overflow u64.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use qualify_core::QualifyConfig;
use qualify_core::processor::{MutationProcessor, ProcessorError, ScanReport};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::signal::{WakeReason, WakeSignal};

/// Errors that stop the worker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// The processor failed outside a scan pass.
    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Scan interval when no ping arrives.
    pub poll_interval: Duration,
    /// Stop after this long; run until shutdown when `None`.
    pub run_for: Option<Duration>,
    /// Reset the checkpoint before the first scan.
    pub rescan: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            run_for: None,
            rescan: false,
        }
    }
}

impl WorkerConfig {
    /// Builds the worker configuration from the `[worker]` section.
    #[must_use]
    pub fn from_config(config: &QualifyConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
            run_for: config.worker.run_for_secs.map(Duration::from_secs),
            rescan: false,
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the run duration.
    #[must_use]
    pub const fn with_run_for(mut self, run_for: Option<Duration>) -> Self {
        self.run_for = run_for;
        self
    }

    /// Resets the checkpoint before the first scan.
    #[must_use]
    pub const fn with_rescan(mut self, rescan: bool) -> Self {
        self.rescan = rescan;
        self
    }
}

/// Counters kept by a running worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Completed scan passes.
    pub scans: u64,
    /// Scan passes aborted by a storage error.
    pub failed_scans: u64,
    /// Mutations applied.
    pub applied: u64,
    /// Records skipped as already processed.
    pub skipped: u64,
    /// Mutations whose target had vanished.
    pub missing: u64,
    /// Records whose payload could not be decoded.
    pub undecodable: u64,
    /// Consistency issues flagged.
    pub issues: u64,
    /// Pings received from the dispatcher.
    pub pings: u64,
}

impl WorkerStats {
    fn record(&mut self, report: &ScanReport) {
        self.scans += 1;
        self.applied += report.applied;
        self.skipped += report.skipped;
        self.missing += report.missing;
        self.undecodable += report.undecodable;
        self.issues += report.issues;
    }
}

/// Stops a running worker.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    signal: Arc<WakeSignal>,
}

impl ShutdownHandle {
    /// Requests shutdown and wakes the worker.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.signal.wake();
    }

    /// Returns true once shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The background mutation worker.
pub struct MutationWorker {
    processor: Arc<MutationProcessor>,
    signal: Arc<WakeSignal>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
    stats: WorkerStats,
}

impl MutationWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        processor: Arc<MutationProcessor>,
        signal: Arc<WakeSignal>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            processor,
            signal,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: WorkerStats::default(),
        }
    }

    /// Returns a handle that stops the worker.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            signal: Arc::clone(&self.signal),
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Runs until shutdown is requested or the run duration elapses.
    ///
    /// A scan pass that fails on storage is logged and retried on the next
    /// wake-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint reset requested by `rescan` fails
    /// or a blocking task panics.
    pub async fn run(&mut self) -> Result<WorkerStats, WorkerError> {
        info!(
            worker = %self.processor.worker_name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            run_for_secs = self.config.run_for.map(|d| d.as_secs()),
            checkpoint = self.processor.checkpoint(),
            "mutation worker starting"
        );

        if self.config.rescan {
            let processor = Arc::clone(&self.processor);
            tokio::task::spawn_blocking(move || processor.reset_checkpoint()).await??;
        }

        let deadline = self.config.run_for.map(|d| Instant::now() + d);
        let mut seen_pings = self.signal.count();
        let mut force_scan = true;

        while !self.shutdown.load(Ordering::SeqCst) {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!("run duration elapsed");
                break;
            }

            if force_scan || self.ledger_moved().await? {
                self.scan().await?;
            }

            let timeout = deadline.map_or(self.config.poll_interval, |deadline| {
                self.config
                    .poll_interval
                    .min(deadline.saturating_duration_since(Instant::now()))
            });
            force_scan = match self.signal.wait(seen_pings, timeout).await {
                WakeReason::Pinged => {
                    let count = self.signal.count();
                    self.stats.pings += count.saturating_sub(seen_pings);
                    seen_pings = count;
                    true
                },
                WakeReason::Woken | WakeReason::Timeout => false,
            };
        }

        info!(
            scans = self.stats.scans,
            failed_scans = self.stats.failed_scans,
            applied = self.stats.applied,
            skipped = self.stats.skipped,
            missing = self.stats.missing,
            undecodable = self.stats.undecodable,
            issues = self.stats.issues,
            pings = self.stats.pings,
            "mutation worker stopped"
        );
        Ok(self.stats)
    }

    /// Returns true when the ledger head is past the checkpoint.
    async fn ledger_moved(&self) -> Result<bool, WorkerError> {
        let processor = Arc::clone(&self.processor);
        let head = tokio::task::spawn_blocking(move || processor.ledger_head()).await?;
        match head {
            Ok(head) => Ok(head > self.processor.checkpoint()),
            Err(e) => {
                error!(error = %e, "failed to read ledger head");
                Ok(false)
            },
        }
    }

    async fn scan(&mut self) -> Result<(), WorkerError> {
        let processor = Arc::clone(&self.processor);
        match tokio::task::spawn_blocking(move || processor.scan_once()).await? {
            Ok(report) => {
                if report.examined() > 0 {
                    info!(
                        head = report.head,
                        applied = report.applied,
                        skipped = report.skipped,
                        missing = report.missing,
                        undecodable = report.undecodable,
                        issues = report.issues,
                        "scan pass applied mutations"
                    );
                } else {
                    debug!(head = report.head, "scan pass found nothing new");
                }
                self.stats.record(&report);
            },
            Err(e) => {
                error!(error = %e, "scan pass aborted, will retry");
                self.stats.failed_scans += 1;
            },
        }
        Ok(())
    }
}
