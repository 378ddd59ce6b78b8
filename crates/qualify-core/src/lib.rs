//! qualify-core - Championship qualification ranking engine
//!
//! Maintains, per championship and competition class, a capacity-limited,
//! strictly ordered list of qualified participants. Changes arrive as
//! mutations in an append-only ledger and are applied exactly once, in
//! order, by a single background worker.
//!
//! # Modules
//!
//! - [`model`]: participants, identifiers and class keys
//! - [`store`]: `SQLite` connection shared by all components
//! - [`registry`]: per-class ordered participant storage and cut limits
//! - [`ranking`]: recompute, withdrawal and registration algorithms
//! - [`ledger`]: the mutation ledger
//! - [`checkpoint`]: persisted worker position
//! - [`reconcile`]: flags for manual reconciliation
//! - [`processor`]: one exactly-once scan pass over the ledger
//! - [`config`]: TOML configuration

pub mod checkpoint;
pub mod config;
pub mod ledger;
pub mod model;
pub mod processor;
pub mod ranking;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use config::QualifyConfig;
pub use ledger::{Mutation, MutationRecord};
pub use model::{ChampionshipId, ClassId, ClassKey, Participant, ParticipantId};
pub use processor::{MutationProcessor, ScanReport};
pub use store::Store;
