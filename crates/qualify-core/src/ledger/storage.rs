//! `SQLite`-backed mutation ledger.
//!
//! Mutations are appended with a monotonic `seq_id` and never deleted. The
//! only update is the transition to `processed`, which the worker commits
//! together with the registry changes it caused.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use super::mutation::{Mutation, MutationRecord};
use crate::store::{self, SharedConnection, StoreError, now_ns};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Mutation not found.
    #[error("mutation not found: seq_id={seq_id}")]
    NotFound {
        /// The sequence ID that was not found.
        seq_id: u64,
    },

    /// Payload could not be encoded or decoded.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store error (connection poisoned).
    #[error(transparent)]
    Store(#[from] StoreError),
}

const RECORD_COLUMNS: &str =
    "seq_id, payload, requested_by, processed, created_at_ns, processed_at_ns";

/// Raw row as stored; the payload is decoded outside the row callback so
/// decode errors surface as [`LedgerError::Serialization`].
struct RawRecord {
    seq_id: u64,
    payload: String,
    requested_by: String,
    processed: bool,
    created_at_ns: u64,
    processed_at_ns: Option<u64>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq_id: row.get::<_, i64>(0)? as u64,
            payload: row.get(1)?,
            requested_by: row.get(2)?,
            processed: row.get(3)?,
            created_at_ns: row.get::<_, i64>(4)? as u64,
            processed_at_ns: row.get::<_, Option<i64>>(5)?.map(|ns| ns as u64),
        })
    }

    fn decode(self) -> Result<MutationRecord, LedgerError> {
        Ok(MutationRecord {
            seq_id: self.seq_id,
            mutation: serde_json::from_str(&self.payload)?,
            requested_by: self.requested_by,
            processed: self.processed,
            created_at_ns: self.created_at_ns,
            processed_at_ns: self.processed_at_ns,
        })
    }
}

/// Appends a mutation and returns its sequence id.
pub fn append(
    conn: &Connection,
    mutation: &Mutation,
    requested_by: &str,
) -> Result<u64, LedgerError> {
    let payload = serde_json::to_string(mutation)?;
    conn.execute(
        "INSERT INTO mutations (kind, payload, requested_by, processed, created_at_ns)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![
            mutation.kind().as_str(),
            payload,
            requested_by,
            now_ns() as i64
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Reads one mutation.
pub fn read_one(conn: &Connection, seq_id: u64) -> Result<MutationRecord, LedgerError> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM mutations WHERE seq_id = ?1");
    conn.query_row(&sql, params![seq_id as i64], RawRecord::from_row)
        .optional()?
        .ok_or(LedgerError::NotFound { seq_id })?
        .decode()
}

/// Reads the `processed` flag of one mutation without decoding its payload.
pub fn is_processed(conn: &Connection, seq_id: u64) -> Result<bool, LedgerError> {
    conn.query_row(
        "SELECT processed FROM mutations WHERE seq_id = ?1",
        params![seq_id as i64],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(LedgerError::NotFound { seq_id })
}

/// Sequence ids in `(after, up_to]`, ascending.
pub fn seq_ids_between(conn: &Connection, after: u64, up_to: u64) -> Result<Vec<u64>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT seq_id FROM mutations WHERE seq_id > ?1 AND seq_id <= ?2 ORDER BY seq_id ASC",
    )?;
    let rows = stmt.query_map(params![after as i64, up_to as i64], |row| {
        row.get::<_, i64>(0).map(|id| id as u64)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Highest sequence id, or 0 for an empty ledger.
pub fn head(conn: &Connection) -> Result<u64, LedgerError> {
    let max: Option<i64> =
        conn.query_row("SELECT MAX(seq_id) FROM mutations", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0) as u64)
}

/// Marks a mutation processed.
pub fn mark_processed(conn: &Connection, seq_id: u64) -> Result<(), LedgerError> {
    let changed = conn.execute(
        "UPDATE mutations SET processed = 1, processed_at_ns = ?1 WHERE seq_id = ?2",
        params![now_ns() as i64, seq_id as i64],
    )?;
    if changed == 0 {
        return Err(LedgerError::NotFound { seq_id });
    }
    Ok(())
}

/// Mutation ledger over the shared connection.
#[derive(Debug, Clone)]
pub struct MutationLedger {
    conn: SharedConnection,
}

impl MutationLedger {
    /// Creates a ledger over `conn`.
    #[must_use]
    pub const fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Appends a mutation and returns its sequence id.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation cannot be encoded or inserted.
    pub fn append(&self, mutation: &Mutation, requested_by: &str) -> Result<u64, LedgerError> {
        let conn = store::lock(&self.conn)?;
        append(&conn, mutation, requested_by)
    }

    /// Reads one mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the sequence id does not exist.
    pub fn read_one(&self, seq_id: u64) -> Result<MutationRecord, LedgerError> {
        let conn = store::lock(&self.conn)?;
        read_one(&conn, seq_id)
    }

    /// Reads up to `limit` mutations after `cursor`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or payload decoding fails.
    pub fn read_from(
        &self,
        cursor: u64,
        limit: u64,
        pending_only: bool,
    ) -> Result<Vec<MutationRecord>, LedgerError> {
        let conn = store::lock(&self.conn)?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM mutations
             WHERE seq_id > ?1 AND (?2 = 0 OR processed = 0)
             ORDER BY seq_id ASC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(
                params![cursor as i64, pending_only, limit as i64],
                RawRecord::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRecord::decode).collect()
    }

    /// Sequence ids in `(after, up_to]`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn seq_ids_between(&self, after: u64, up_to: u64) -> Result<Vec<u64>, LedgerError> {
        let conn = store::lock(&self.conn)?;
        seq_ids_between(&conn, after, up_to)
    }

    /// Highest sequence id, or 0 for an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn head(&self) -> Result<u64, LedgerError> {
        let conn = store::lock(&self.conn)?;
        head(&conn)
    }

    /// Marks a mutation processed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if the sequence id does not exist.
    pub fn mark_processed(&self, seq_id: u64) -> Result<(), LedgerError> {
        let conn = store::lock(&self.conn)?;
        mark_processed(&conn, seq_id)
    }

    /// Number of mutations not yet processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn pending_count(&self) -> Result<u64, LedgerError> {
        let conn = store::lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutations WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
