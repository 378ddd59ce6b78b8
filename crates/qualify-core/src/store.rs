//! `SQLite` connection management.
//!
//! One database holds participants, cut limits, the mutation ledger, worker
//! checkpoints and reconciliation flags. Every component shares the same
//! connection so that applying a mutation and marking it processed commit
//! in a single transaction.

// Timestamps won't overflow u64 until the year 2554.
#![allow(clippy::cast_possible_truncation)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::checkpoint::CheckpointStore;
use crate::ledger::MutationLedger;
use crate::model::DEFAULT_CUT_LIMIT;
use crate::reconcile::ReconciliationLog;
use crate::registry::Registry;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Connection handle shared between stores.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Errors raised while opening or locking the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection.
    #[error("connection mutex poisoned: {0}")]
    Poisoned(String),
}

/// Owner of the shared `SQLite` connection.
#[derive(Debug, Clone)]
pub struct Store {
    conn: SharedConnection,
    path: Option<PathBuf>,
    default_cut_limit: u32,
}

impl Store {
    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
            default_cut_limit: DEFAULT_CUT_LIMIT,
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
            default_cut_limit: DEFAULT_CUT_LIMIT,
        })
    }

    /// Overrides the cut limit used for classes without a stored limit.
    #[must_use]
    pub const fn with_default_cut_limit(mut self, limit: u32) -> Self {
        self.default_cut_limit = limit;
        self
    }

    /// Returns the database path, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the cut limit used for classes without a stored limit.
    #[must_use]
    pub const fn default_cut_limit(&self) -> u32 {
        self.default_cut_limit
    }

    /// Returns a clone of the shared connection handle.
    #[must_use]
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Participant registry backed by this store.
    #[must_use]
    pub fn registry(&self) -> Registry {
        Registry::new(self.connection(), self.default_cut_limit)
    }

    /// Mutation ledger backed by this store.
    #[must_use]
    pub fn ledger(&self) -> MutationLedger {
        MutationLedger::new(self.connection())
    }

    /// Worker checkpoint store backed by this store.
    #[must_use]
    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.connection())
    }

    /// Reconciliation flag log backed by this store.
    #[must_use]
    pub fn reconciliation(&self) -> ReconciliationLog {
        ReconciliationLog::new(self.connection())
    }
}

/// Locks the shared connection, mapping poisoning to an error.
pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|e| StoreError::Poisoned(e.to_string()))
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub(crate) fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod unit_tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qualify.db");

        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));

        let conn = store.connection();
        let conn = lock(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('participants', 'cut_limits', 'mutations', 'worker_checkpoints', 'reconciliation_flags')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qualify.db");

        drop(Store::open(&path).unwrap());
        let store = Store::open(&path).unwrap();
        assert_eq!(store.default_cut_limit(), DEFAULT_CUT_LIMIT);
    }

    #[test]
    fn test_default_cut_limit_override() {
        let store = Store::in_memory().unwrap().with_default_cut_limit(8);
        assert_eq!(store.default_cut_limit(), 8);
        assert!(store.path().is_none());
    }
}
