//! Persisted worker checkpoint.
//!
//! The checkpoint holds the highest ledger sequence id a worker has
//! scanned. It is read once when the worker starts and advanced after each
//! scan pass, so a restarted worker resumes where it left off.

// SQLite returns i64 for sequence ids, but they're always non-negative.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use rusqlite::{OptionalExtension, params};
use thiserror::Error;

use crate::store::{self, SharedConnection, StoreError, now_ns};

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store error (connection poisoned).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Checkpoint not found.
    #[error("no checkpoint found for worker '{worker_name}'")]
    NotFound {
        /// The worker name that was not found.
        worker_name: String,
    },
}

/// A saved worker position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCheckpoint {
    /// Name of the worker this checkpoint belongs to.
    pub worker_name: String,
    /// Highest sequence id scanned.
    pub last_seq_id: u64,
    /// Time of the last update.
    pub updated_at_ns: u64,
}

/// Storage for worker checkpoints, one row per worker name.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    conn: SharedConnection,
}

impl CheckpointStore {
    /// Creates a checkpoint store over `conn`.
    #[must_use]
    pub const fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Saves the position of a worker, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save(&self, worker_name: &str, last_seq_id: u64) -> Result<(), CheckpointError> {
        let conn = store::lock(&self.conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO worker_checkpoints (worker_name, last_seq_id, updated_at_ns)
             VALUES (?1, ?2, ?3)",
            params![worker_name, last_seq_id as i64, now_ns() as i64],
        )?;
        Ok(())
    }

    /// Loads the position of a worker.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] if the worker has never saved.
    pub fn load(&self, worker_name: &str) -> Result<WorkerCheckpoint, CheckpointError> {
        let conn = store::lock(&self.conn)?;
        conn.query_row(
            "SELECT worker_name, last_seq_id, updated_at_ns
             FROM worker_checkpoints WHERE worker_name = ?1",
            params![worker_name],
            |row| {
                Ok(WorkerCheckpoint {
                    worker_name: row.get(0)?,
                    last_seq_id: row.get::<_, i64>(1)? as u64,
                    updated_at_ns: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .optional()?
        .ok_or_else(|| CheckpointError::NotFound {
            worker_name: worker_name.to_string(),
        })
    }

    /// Loads the position of a worker, or 0 if it has never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load_or_genesis(&self, worker_name: &str) -> Result<u64, CheckpointError> {
        match self.load(worker_name) {
            Ok(checkpoint) => Ok(checkpoint.last_seq_id),
            Err(CheckpointError::NotFound { .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }
}
