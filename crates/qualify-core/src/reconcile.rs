//! Reconciliation flags raised by consistency issues.
//!
//! The worker never fails a mutation because an invariant looked wrong. It
//! applies a best-effort update and records a flag here so an operator can
//! review the class by hand. Ledger records whose payload cannot be decoded
//! are flagged here too, without a class.

// SQLite returns i64 for row IDs, but they're always non-negative.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use rusqlite::{Connection, params};
use thiserror::Error;

use crate::model::{ChampionshipId, ClassId, ClassKey};
use crate::ranking::ConsistencyIssue;
use crate::store::{self, SharedConnection, StoreError, now_ns};

/// Errors that can occur while reading or writing flags.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store error (connection poisoned).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A recorded consistency issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationFlag {
    /// Flag id.
    pub id: u64,
    /// Mutation during which the issue was found.
    pub seq_id: u64,
    /// Affected class; `None` when the mutation could not be decoded.
    pub class: Option<ClassKey>,
    /// Issue kind, see [`ConsistencyIssue::kind`].
    pub kind: String,
    /// Human-readable detail.
    pub detail: String,
    /// Time the flag was raised.
    pub created_at_ns: u64,
}

/// Flag kind for ledger records whose payload could not be decoded.
pub const UNDECODABLE_PAYLOAD: &str = "undecodable_payload";

fn insert(
    conn: &Connection,
    seq_id: u64,
    class: Option<ClassKey>,
    kind: &str,
    detail: &str,
) -> Result<u64, ReconcileError> {
    conn.execute(
        "INSERT INTO reconciliation_flags (seq_id, championship, class, kind, detail, created_at_ns)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            seq_id as i64,
            class.map(|c| c.championship.0 as i64),
            class.map(|c| c.class.0 as i64),
            kind,
            detail,
            now_ns() as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Records a flag using an existing connection or transaction.
pub fn record(
    conn: &Connection,
    seq_id: u64,
    class: ClassKey,
    issue: &ConsistencyIssue,
) -> Result<u64, ReconcileError> {
    insert(conn, seq_id, Some(class), issue.kind(), &issue.to_string())
}

/// Records a ledger record whose payload could not be decoded.
pub fn record_undecodable(
    conn: &Connection,
    seq_id: u64,
    detail: &str,
) -> Result<u64, ReconcileError> {
    insert(conn, seq_id, None, UNDECODABLE_PAYLOAD, detail)
}

/// Read access to reconciliation flags.
#[derive(Debug, Clone)]
pub struct ReconciliationLog {
    conn: SharedConnection,
}

impl ReconciliationLog {
    /// Creates a flag log over `conn`.
    #[must_use]
    pub const fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Records a flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record(
        &self,
        seq_id: u64,
        class: ClassKey,
        issue: &ConsistencyIssue,
    ) -> Result<u64, ReconcileError> {
        let conn = store::lock(&self.conn)?;
        record(&conn, seq_id, class, issue)
    }

    /// Lists all flags, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self) -> Result<Vec<ReconciliationFlag>, ReconcileError> {
        let conn = store::lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, seq_id, championship, class, kind, detail, created_at_ns
             FROM reconciliation_flags ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ReconciliationFlag {
                id: row.get::<_, i64>(0)? as u64,
                seq_id: row.get::<_, i64>(1)? as u64,
                class: match (row.get::<_, Option<i64>>(2)?, row.get::<_, Option<i64>>(3)?) {
                    (Some(championship), Some(class)) => Some(ClassKey::new(
                        ChampionshipId(championship as u64),
                        ClassId(class as u64),
                    )),
                    _ => None,
                },
                kind: row.get(4)?,
                detail: row.get(5)?,
                created_at_ns: row.get::<_, i64>(6)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
