//! Ranking engine: recomputes total order and visible rank per mutation.
//!
//! # Operations
//!
//! - [`determine_participants`]: full recompute used by the initial
//!   positioning and by cut changes
//! - [`change_cut`]: stores a new limit on the standings, then recomputes
//! - [`withdraw`]: withdraws a participant and promotes the first waiting
//!   participant when a qualified place was vacated
//! - [`register`]: confirms a participant, or re-inserts a withdrawn one
//!
//! Each operation works on [`ClassStandings`], the class list loaded once,
//! and reports invariant surprises as [`ConsistencyIssue`] values instead
//! of failing.
//!
//! # Example
//!
//! ```rust,ignore
//! let (mut standings, issues) = ClassStandings::load(key, limit, registry.get_ordered(key)?);
//! let outcome = withdraw(&mut standings, participant, &Attribution::now("secretary"))?;
//! for p in standings.changed() {
//!     queries::save_participant(&tx, p)?;
//! }
//! ```

mod engine;
mod standings;


pub use engine::{
    Attribution, Placement, RankingError, RankingOutcome, change_cut, determine_participants,
    register, withdraw,
};
pub use standings::{ClassStandings, ConsistencyIssue};
