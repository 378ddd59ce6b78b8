//! Participant registry: storage of per-class ordered participant state.
//!
//! The registry exposes the ordered list of a class, the champion subset,
//! single-field writers for `total_order` and `visible_rank`, and the bulk
//! order shift used by insertions and removals. Cut limits are stored per
//! class; a class without a stored limit uses the store default.
//!
//! Read-only consumers (reports, exports) use [`Registry`] directly. The
//! mutation processor uses the connection-level functions in [`queries`]
//! inside its own transaction.
//!
//! # Example
//!
//! ```rust,no_run
//! use qualify_core::model::{ChampionshipId, ClassId, ClassKey};
//! use qualify_core::store::Store;
//!
//! let store = Store::open("qualify.db").unwrap();
//! let registry = store.registry();
//! let key = ClassKey::new(ChampionshipId(1), ClassId(100));
//! for p in registry.get_ordered(key).unwrap() {
//!     println!("{:>3} {:>3} {}", p.total_order, p.visible_rank, p.name);
//! }
//! ```

pub mod queries;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::model::{
    ChampionshipId, ClassId, ClassKey, NewParticipant, Participant, ParticipantId,
};
use crate::store::{self, SharedConnection, StoreError};

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The participant does not exist.
    #[error("participant not found: {id}")]
    NotFound {
        /// The missing participant.
        id: ParticipantId,
    },

    /// A cut limit must be positive.
    #[error("invalid cut limit: {limit}")]
    InvalidCutLimit {
        /// The rejected limit.
        limit: u32,
    },

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store error (connection poisoned).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Returns true when the error reports a missing participant.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Participant registry over the shared connection.
#[derive(Debug, Clone)]
pub struct Registry {
    conn: SharedConnection,
    default_cut_limit: u32,
}

impl Registry {
    /// Creates a registry over `conn`.
    #[must_use]
    pub const fn new(conn: SharedConnection, default_cut_limit: u32) -> Self {
        Self {
            conn,
            default_cut_limit,
        }
    }

    /// Enrolls a participant at the end of its class.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn enroll(&self, new: &NewParticipant) -> Result<Participant, RegistryError> {
        let conn = store::lock(&self.conn)?;
        let id = queries::insert_participant(&conn, new)?;
        queries::load_participant(&conn, id)
    }

    /// Loads a participant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the participant does not exist.
    pub fn get(&self, id: ParticipantId) -> Result<Participant, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::load_participant(&conn, id)
    }

    /// Returns the participants of a class ordered by `total_order`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_ordered(&self, key: ClassKey) -> Result<Vec<Participant>, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::load_ordered(&conn, key)
    }

    /// Returns the defending champions of a class, irrespective of withdrawal.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_champions(&self, key: ClassKey) -> Result<Vec<Participant>, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::load_champions(&conn, key)
    }

    /// Sets `total_order` of one participant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the participant does not exist.
    pub fn set_order(&self, id: ParticipantId, total_order: u32) -> Result<(), RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::update_order(&conn, id, total_order)
    }

    /// Sets `visible_rank` of one participant.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the participant does not exist.
    pub fn set_rank(&self, id: ParticipantId, visible_rank: u32) -> Result<(), RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::update_rank(&conn, id, visible_rank)
    }

    /// Shifts `total_order` by `delta` for every participant at or after
    /// `from_inclusive`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn shift_order(
        &self,
        key: ClassKey,
        from_inclusive: u32,
        delta: i64,
    ) -> Result<usize, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::shift_order(&conn, key, from_inclusive, delta)
    }

    /// Returns the cut limit of a class.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn cut_limit(&self, key: ClassKey) -> Result<u32, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::load_cut_limit(&conn, key, self.default_cut_limit)
    }

    /// Stores the cut limit of a class.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidCutLimit`] for a zero limit.
    pub fn set_cut_limit(&self, key: ClassKey, limit: u32) -> Result<(), RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::store_cut_limit(&conn, key, limit, self.default_cut_limit)
    }

    /// Returns true when the class has participants or a stored cut limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn class_exists(&self, key: ClassKey) -> Result<bool, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::class_exists(&conn, key)
    }

    /// Returns the classes of a championship that have participants.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn classes(&self, championship: ChampionshipId) -> Result<Vec<ClassId>, RegistryError> {
        let conn = store::lock(&self.conn)?;
        queries::classes(&conn, championship)
    }

    /// Returns the cut limit used for classes without a stored limit.
    #[must_use]
    pub const fn default_cut_limit(&self) -> u32 {
        self.default_cut_limit
    }
}
