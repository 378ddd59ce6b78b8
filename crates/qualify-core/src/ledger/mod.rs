//! Mutation ledger: append-only, sequence-numbered change intents.
//!
//! Each [`MutationRecord`] carries a tagged [`Mutation`] payload, the name
//! of the requester and a `processed` flag set by the worker once the
//! mutation has been applied. Records are never removed, so the ledger
//! doubles as an audit trail.
//!
//! # Example
//!
//! ```rust,no_run
//! use qualify_core::ledger::Mutation;
//! use qualify_core::model::ParticipantId;
//! use qualify_core::store::Store;
//!
//! let store = Store::open("qualify.db").unwrap();
//! let ledger = store.ledger();
//! let seq_id = ledger
//!     .append(&Mutation::Withdrawn { participant: ParticipantId(12) }, "secretary")
//!     .unwrap();
//! assert!(!ledger.read_one(seq_id).unwrap().processed);
//! ```

mod mutation;
pub mod storage;


pub use mutation::{Mutation, MutationKind, MutationRecord};
pub use storage::{LedgerError, MutationLedger};
