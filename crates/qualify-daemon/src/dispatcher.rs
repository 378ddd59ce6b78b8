//! Mutation dispatcher.
//!
//! Validates a mutation, appends it to the ledger and pings the worker.
//! Callers that ask to wait are polled with a doubling backoff until the
//! record is processed or the wait budget is spent. An elapsed wait does
//! not cancel the mutation; the worker still applies it later.

// Durations in milliseconds won't overflow u64.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::time::Duration;

use qualify_core::QualifyConfig;
use qualify_core::ledger::{LedgerError, Mutation, MutationRecord};
use qualify_core::model::ClassKey;
use qualify_core::registry::RegistryError;
use qualify_core::store::Store;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::signal::WakeSignal;

/// Errors raised while dispatching a mutation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The payload was rejected; nothing was appended.
    #[error("invalid mutation: {0}")]
    Validation(String),

    /// Registry lookup failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Ledger access failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// Returns true if the mutation was rejected before reaching the ledger.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Dispatcher wait configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// First poll delay; doubled after every poll.
    pub initial_backoff: Duration,
    /// Total time a waiting caller may spend sleeping.
    pub max_total_wait: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_total_wait: Duration::from_millis(3000),
        }
    }
}

impl DispatcherConfig {
    /// Builds the configuration from the `[dispatcher]` section.
    #[must_use]
    pub const fn from_config(config: &QualifyConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.dispatcher.initial_backoff_ms),
            max_total_wait: Duration::from_millis(config.dispatcher.max_total_wait_ms),
        }
    }

    /// Sets the first poll delay.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Sets the total wait budget.
    #[must_use]
    pub const fn with_max_total_wait(mut self, max: Duration) -> Self {
        self.max_total_wait = max;
        self
    }

    /// Sleep durations a waiting caller goes through.
    #[must_use]
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut schedule = Vec::new();
        let mut interval = self.initial_backoff;
        let mut total = Duration::ZERO;
        while !interval.is_zero() && total + interval <= self.max_total_wait {
            schedule.push(interval);
            total += interval;
            interval *= 2;
        }
        schedule
    }
}

/// Appends mutations to the ledger on behalf of callers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Store,
    signal: Option<Arc<WakeSignal>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher that pings an in-process worker.
    #[must_use]
    pub const fn new(store: Store, signal: Arc<WakeSignal>, config: DispatcherConfig) -> Self {
        Self {
            store,
            signal: Some(signal),
            config,
        }
    }

    /// Creates a dispatcher for a worker running in another process.
    ///
    /// That worker notices new records on its next poll.
    #[must_use]
    pub const fn detached(store: Store, config: DispatcherConfig) -> Self {
        Self {
            store,
            signal: None,
            config,
        }
    }

    /// Returns the wait configuration.
    #[must_use]
    pub const fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Checks a mutation against the registry.
    ///
    /// Returns the mutation to append. A `CutChanged` gets its `old_limit`
    /// replaced by the limit currently stored for the class.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] if the payload references a
    /// missing class or participant or carries a zero limit.
    pub fn validate(&self, mutation: Mutation) -> Result<Mutation, DispatchError> {
        let registry = self.store.registry();
        match mutation {
            Mutation::Initial {
                championship,
                class: None,
            } => {
                if registry.classes(championship)?.is_empty() {
                    return Err(DispatchError::Validation(format!(
                        "championship {championship} has no participants"
                    )));
                }
                Ok(mutation)
            },
            Mutation::Initial {
                championship,
                class: Some(class),
            } => {
                let key = ClassKey::new(championship, class);
                if !registry.class_exists(key)? {
                    return Err(DispatchError::Validation(format!("class {key} does not exist")));
                }
                Ok(mutation)
            },
            Mutation::CutChanged {
                championship,
                class,
                new_limit,
                ..
            } => {
                if new_limit == 0 {
                    return Err(DispatchError::Validation(
                        "cut limit must be at least 1".to_string(),
                    ));
                }
                let key = ClassKey::new(championship, class);
                if !registry.class_exists(key)? {
                    return Err(DispatchError::Validation(format!("class {key} does not exist")));
                }
                Ok(Mutation::CutChanged {
                    championship,
                    class,
                    old_limit: registry.cut_limit(key)?,
                    new_limit,
                })
            },
            Mutation::Registered { participant } | Mutation::Withdrawn { participant } => {
                match registry.get(participant) {
                    Ok(_) => Ok(mutation),
                    Err(e) if e.is_not_found() => Err(DispatchError::Validation(format!(
                        "participant {participant} does not exist"
                    ))),
                    Err(e) => Err(e.into()),
                }
            },
        }
    }

    /// Validates, appends and signals a mutation.
    ///
    /// With `wait`, polls the record until it is processed or the wait
    /// budget is spent, then returns the record as last read. Callers
    /// should treat `processed == false` as pending.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the ledger cannot be written
    /// or read.
    pub async fn request_mutation(
        &self,
        mutation: Mutation,
        requested_by: &str,
        wait: bool,
    ) -> Result<MutationRecord, DispatchError> {
        let this = self.clone();
        let requested_by = requested_by.to_string();
        let record = tokio::task::spawn_blocking(move || {
            let mutation = this.validate(mutation)?;
            let ledger = this.store.ledger();
            let seq_id = ledger.append(&mutation, &requested_by)?;
            Ok::<_, DispatchError>(ledger.read_one(seq_id)?)
        })
        .await??;

        info!(
            seq_id = record.seq_id,
            mutation = %record.mutation,
            requested_by = %record.requested_by,
            "mutation appended"
        );
        if let Some(signal) = &self.signal {
            signal.ping();
        }

        if !wait {
            return Ok(record);
        }
        self.wait_processed(record).await
    }

    async fn wait_processed(&self, mut record: MutationRecord) -> Result<MutationRecord, DispatchError> {
        for interval in self.config.backoff_schedule() {
            if record.processed {
                break;
            }
            tokio::time::sleep(interval).await;
            debug!(
                seq_id = record.seq_id,
                slept_ms = interval.as_millis() as u64,
                "polling mutation state"
            );
            let ledger = self.store.ledger();
            let seq_id = record.seq_id;
            record = tokio::task::spawn_blocking(move || ledger.read_one(seq_id)).await??;
        }

        if !record.processed {
            warn!(
                seq_id = record.seq_id,
                max_total_wait_ms = self.config.max_total_wait.as_millis() as u64,
                "mutation still pending after wait"
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = DispatcherConfig::default().backoff_schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
        assert!(schedule.iter().sum::<Duration>() <= Duration::from_secs(3));
    }

    #[test]
    fn test_schedule_empty_when_budget_too_small() {
        let config = DispatcherConfig::default().with_max_total_wait(Duration::from_millis(100));
        assert!(config.backoff_schedule().is_empty());
    }

    #[test]
    fn test_zero_backoff_does_not_loop() {
        let config = DispatcherConfig::default().with_initial_backoff(Duration::ZERO);
        assert!(config.backoff_schedule().is_empty());
    }
}
