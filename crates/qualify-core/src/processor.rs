//! Exactly-once application of ledger mutations.
//!
//! [`MutationProcessor::scan_once`] is one pass of the background worker:
//! it captures the ledger head, applies every unprocessed mutation after
//! the checkpoint in ascending order, and then advances the checkpoint to
//! the captured head. Mutations appended during the pass are left for the
//! next one.
//!
//! Each mutation is re-read inside its own transaction; the registry writes,
//! the reconciliation flags and the `processed` flag commit together, so a
//! restarted worker never applies a mutation twice.
//!
//! Only storage failures abort a pass. A record whose payload cannot be
//! decoded is flagged for reconciliation and marked processed like a
//! mutation whose target has vanished.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::ledger::{LedgerError, Mutation, MutationRecord, storage as ledger};
use crate::model::ClassKey;
use crate::ranking::{self, Attribution, ConsistencyIssue, RankingError};
use crate::reconcile::{self, ReconcileError};
use crate::registry::{RegistryError, queries};
use crate::store::{self, SharedConnection, Store, StoreError};

/// Errors that can occur while processing mutations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessorError {
    /// Registry read or write failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Ledger read or write failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Checkpoint read or write failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Reconciliation flag could not be recorded.
    #[error("reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Ranking operation rejected its target.
    #[error("ranking error: {0}")]
    Ranking(#[from] RankingError),

    /// The target class no longer exists.
    #[error("class not found: {key}")]
    ClassNotFound {
        /// The missing class.
        key: ClassKey,
    },

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store error (connection poisoned).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessorError {
    /// Returns true when the mutation target has vanished. Such mutations
    /// are marked processed without effect.
    #[must_use]
    pub const fn is_target_missing(&self) -> bool {
        matches!(
            self,
            Self::Registry(RegistryError::NotFound { .. })
                | Self::Ranking(RankingError::NotInClass { .. })
                | Self::ClassNotFound { .. }
        )
    }
}

/// Result of applying one ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// The mutation was applied.
    Applied {
        /// Number of consistency issues flagged.
        issues: usize,
    },
    /// The record was already processed and was skipped.
    AlreadyProcessed,
    /// The target was gone; the record was marked processed without effect.
    TargetMissing,
    /// The payload could not be decoded; the record was flagged and marked
    /// processed without effect.
    Undecodable,
}

/// Summary of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Checkpoint at the start of the pass.
    pub checkpoint: u64,
    /// Ledger head captured at the start of the pass.
    pub head: u64,
    /// Mutations applied.
    pub applied: u64,
    /// Records skipped because they were already processed.
    pub skipped: u64,
    /// Mutations whose target had vanished.
    pub missing: u64,
    /// Records whose payload could not be decoded.
    pub undecodable: u64,
    /// Consistency issues flagged.
    pub issues: u64,
}

impl ScanReport {
    /// Number of records examined.
    #[must_use]
    pub const fn examined(&self) -> u64 {
        self.applied + self.skipped + self.missing + self.undecodable
    }
}

/// Applies ledger mutations to the participant registry.
#[derive(Debug)]
pub struct MutationProcessor {
    conn: SharedConnection,
    checkpoints: CheckpointStore,
    worker_name: String,
    default_cut_limit: u32,
    checkpoint: AtomicU64,
}

impl MutationProcessor {
    /// Creates a processor and reads the persisted checkpoint of
    /// `worker_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be read.
    pub fn new(store: &Store, worker_name: impl Into<String>) -> Result<Self, ProcessorError> {
        let worker_name = worker_name.into();
        let checkpoints = store.checkpoints();
        let checkpoint = checkpoints.load_or_genesis(&worker_name)?;
        info!(worker = %worker_name, checkpoint, "loaded worker checkpoint");

        Ok(Self {
            conn: store.connection(),
            checkpoints,
            worker_name,
            default_cut_limit: store.default_cut_limit(),
            checkpoint: AtomicU64::new(checkpoint),
        })
    }

    /// Name under which the checkpoint is stored.
    #[must_use]
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Highest sequence id scanned so far.
    #[must_use]
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint.load(Ordering::SeqCst)
    }

    /// Resets the checkpoint to 0 so the next pass re-examines the whole
    /// ledger. Processed records are still skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be saved.
    pub fn reset_checkpoint(&self) -> Result<(), ProcessorError> {
        self.checkpoints.save(&self.worker_name, 0)?;
        self.checkpoint.store(0, Ordering::SeqCst);
        info!(worker = %self.worker_name, "checkpoint reset");
        Ok(())
    }

    /// Current ledger head.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn ledger_head(&self) -> Result<u64, ProcessorError> {
        let conn = store::lock(&self.conn)?;
        Ok(ledger::head(&conn)?)
    }

    /// Runs one scan pass.
    ///
    /// # Errors
    ///
    /// Returns the first storage error. The checkpoint is not advanced in
    /// that case, so the remaining records are retried on the next pass.
    pub fn scan_once(&self) -> Result<ScanReport, ProcessorError> {
        let head = self.ledger_head()?;
        self.scan_to(head)
    }

    /// Applies the records in `(checkpoint, head]` and advances the
    /// checkpoint to `head`.
    fn scan_to(&self, head: u64) -> Result<ScanReport, ProcessorError> {
        let checkpoint = self.checkpoint();
        let mut report = ScanReport {
            checkpoint,
            head,
            ..ScanReport::default()
        };
        if head <= checkpoint {
            return Ok(report);
        }

        let seq_ids = {
            let conn = store::lock(&self.conn)?;
            ledger::seq_ids_between(&conn, checkpoint, head)?
        };
        for seq_id in seq_ids {
            match self.apply(seq_id)? {
                ApplyStatus::Applied { issues } => {
                    report.applied += 1;
                    report.issues += issues as u64;
                },
                ApplyStatus::AlreadyProcessed => report.skipped += 1,
                ApplyStatus::TargetMissing => report.missing += 1,
                ApplyStatus::Undecodable => report.undecodable += 1,
            }
        }

        self.checkpoints.save(&self.worker_name, head)?;
        self.checkpoint.store(head, Ordering::SeqCst);
        debug!(
            worker = %self.worker_name,
            checkpoint = head,
            applied = report.applied,
            skipped = report.skipped,
            missing = report.missing,
            undecodable = report.undecodable,
            "scan complete"
        );
        Ok(report)
    }

    /// Applies one ledger record unless it is already processed.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure; nothing is committed then.
    pub fn apply(&self, seq_id: u64) -> Result<ApplyStatus, ProcessorError> {
        let mut conn = store::lock(&self.conn)?;
        let tx = conn.transaction()?;

        if ledger::is_processed(&tx, seq_id)? {
            debug!(seq_id, "mutation already processed");
            return Ok(ApplyStatus::AlreadyProcessed);
        }

        let record = match ledger::read_one(&tx, seq_id) {
            Ok(record) => record,
            Err(LedgerError::Serialization(e)) => {
                error!(seq_id, error = %e, "undecodable mutation payload, marking processed");
                reconcile::record_undecodable(&tx, seq_id, &e.to_string())?;
                ledger::mark_processed(&tx, seq_id)?;
                tx.commit()?;
                return Ok(ApplyStatus::Undecodable);
            },
            Err(e) => return Err(e.into()),
        };

        info!(
            seq_id,
            kind = %record.mutation.kind(),
            requested_by = %record.requested_by,
            "applying mutation: {}",
            record.mutation
        );

        let status = match self.apply_mutation(&tx, &record) {
            Ok(issues) => {
                for (key, issue) in &issues {
                    warn!(seq_id, class = %key, issue = %issue, "consistency issue flagged");
                    reconcile::record(&tx, seq_id, *key, issue)?;
                }
                ApplyStatus::Applied {
                    issues: issues.len(),
                }
            },
            Err(e) if e.is_target_missing() => {
                warn!(seq_id, error = %e, "mutation target missing, marking processed");
                ApplyStatus::TargetMissing
            },
            Err(e) => return Err(e),
        };

        ledger::mark_processed(&tx, seq_id)?;
        tx.commit()?;
        Ok(status)
    }

    fn apply_mutation(
        &self,
        conn: &rusqlite::Connection,
        record: &MutationRecord,
    ) -> Result<Vec<(ClassKey, ConsistencyIssue)>, ProcessorError> {
        let by = Attribution::now(record.requested_by.clone());
        let mut flagged = Vec::new();

        match &record.mutation {
            Mutation::Initial {
                championship,
                class,
            } => {
                let classes = match class {
                    Some(class) => {
                        let key = ClassKey::new(*championship, *class);
                        if !queries::class_exists(conn, key)? {
                            return Err(ProcessorError::ClassNotFound { key });
                        }
                        vec![*class]
                    },
                    None => queries::classes(conn, *championship)?,
                };
                for class in classes {
                    let key = ClassKey::new(*championship, class);
                    let (mut standings, issues) =
                        queries::load_standings(conn, key, self.default_cut_limit)?;
                    let outcome = ranking::determine_participants(&mut standings);
                    queries::save_standings(conn, &standings)?;
                    flagged.extend(issues.into_iter().chain(outcome.issues).map(|i| (key, i)));
                }
            },
            Mutation::CutChanged {
                championship,
                class,
                old_limit,
                new_limit,
            } => {
                let key = ClassKey::new(*championship, *class);
                if !queries::class_exists(conn, key)? {
                    return Err(ProcessorError::ClassNotFound { key });
                }
                let (mut standings, issues) =
                    queries::load_standings(conn, key, self.default_cut_limit)?;
                if standings.limit() != *old_limit {
                    debug!(
                        class = %key,
                        stored = standings.limit(),
                        requested = old_limit,
                        "cut changed since the mutation was requested"
                    );
                }
                if standings.limit() == *new_limit {
                    info!(class = %key, limit = new_limit, "cut unchanged, nothing to do");
                    queries::save_standings(conn, &standings)?;
                    flagged.extend(issues.into_iter().map(|i| (key, i)));
                } else {
                    queries::store_cut_limit(conn, key, *new_limit, self.default_cut_limit)?;
                    let outcome = ranking::change_cut(&mut standings, *new_limit);
                    queries::save_standings(conn, &standings)?;
                    flagged.extend(issues.into_iter().chain(outcome.issues).map(|i| (key, i)));
                }
            },
            Mutation::Registered { participant } => {
                let key = queries::load_participant(conn, *participant)?.class_key();
                let (mut standings, issues) =
                    queries::load_standings(conn, key, self.default_cut_limit)?;
                let outcome = ranking::register(&mut standings, *participant, &by)?;
                queries::save_standings(conn, &standings)?;
                flagged.extend(issues.into_iter().chain(outcome.issues).map(|i| (key, i)));
            },
            Mutation::Withdrawn { participant } => {
                let key = queries::load_participant(conn, *participant)?.class_key();
                let (mut standings, issues) =
                    queries::load_standings(conn, key, self.default_cut_limit)?;
                let outcome = ranking::withdraw(&mut standings, *participant, &by)?;
                queries::save_standings(conn, &standings)?;
                flagged.extend(issues.into_iter().chain(outcome.issues).map(|i| (key, i)));
            },
        }

        Ok(flagged)
    }
}

#[cfg(test)]
mod tests;
