//! In-memory ordered list of one class, loaded once per ranking operation.

use std::fmt;

use crate::model::{ClassKey, Participant, ParticipantId};

/// An invariant surprise found while applying a ranking operation.
///
/// Issues never abort the operation; a best-effort update is still applied
/// and the issue is flagged for manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyIssue {
    /// The stored `total_order` values were not a dense permutation and were
    /// renumbered in their stored sequence.
    OrderRenumbered {
        /// Number of participants whose order changed.
        changed: usize,
    },
    /// The stored `visible_rank` values did not follow the order walk and
    /// were recomputed.
    RankRenumbered {
        /// Number of participants whose rank changed.
        changed: usize,
    },
    /// More non-withdrawn champions than places; some champions rank below
    /// the cut.
    ChampionsExceedLimit {
        /// Non-withdrawn champions in the class.
        champions: usize,
        /// Cut limit of the class.
        limit: u32,
    },
}

impl ConsistencyIssue {
    /// Short machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderRenumbered { .. } => "order_renumbered",
            Self::RankRenumbered { .. } => "rank_renumbered",
            Self::ChampionsExceedLimit { .. } => "champions_exceed_limit",
        }
    }
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderRenumbered { changed } => {
                write!(f, "total order not dense, renumbered {changed} participant(s)")
            },
            Self::RankRenumbered { changed } => {
                write!(f, "visible rank inconsistent, recomputed {changed} participant(s)")
            },
            Self::ChampionsExceedLimit { champions, limit } => {
                write!(f, "{champions} active champion(s) exceed cut limit {limit}")
            },
        }
    }
}

/// The ordered participants of one class together with its cut limit.
///
/// Entries are kept sorted by `total_order`. A snapshot of the loaded state
/// is retained so that only changed participants are written back.
#[derive(Debug, Clone)]
pub struct ClassStandings {
    key: ClassKey,
    limit: u32,
    entries: Vec<Participant>,
    loaded: Vec<Participant>,
}

impl ClassStandings {
    /// Builds standings from a class list ordered by `total_order`.
    ///
    /// Non-dense orders or ranks inconsistent with the order walk are
    /// repaired and reported.
    #[must_use]
    pub fn load(
        key: ClassKey,
        limit: u32,
        mut entries: Vec<Participant>,
    ) -> (Self, Vec<ConsistencyIssue>) {
        entries.sort_by_key(|p| p.total_order);
        let loaded = entries.clone();
        let mut standings = Self {
            key,
            limit,
            entries,
            loaded,
        };

        let mut issues = Vec::new();
        let changed = standings.renumber_orders();
        if changed > 0 {
            issues.push(ConsistencyIssue::OrderRenumbered { changed });
        }
        let changed = standings.recompute_ranks();
        if changed > 0 {
            issues.push(ConsistencyIssue::RankRenumbered { changed });
        }

        (standings, issues)
    }

    /// Ranking scope of these standings.
    #[must_use]
    pub const fn key(&self) -> ClassKey {
        self.key
    }

    /// Cut limit in effect.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Replaces the cut limit without reordering.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// Participants in `total_order` sequence.
    #[must_use]
    pub fn entries(&self) -> &[Participant] {
        &self.entries
    }

    /// Number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true for a class without participants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of a participant in the ordered list.
    #[must_use]
    pub fn position(&self, id: ParticipantId) -> Option<usize> {
        self.entries.iter().position(|p| p.id == id)
    }

    /// Looks up a participant.
    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.entries.iter().find(|p| p.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.entries.iter_mut().find(|p| p.id == id)
    }

    /// The participant holding visible rank `limit + 1`.
    #[must_use]
    pub fn first_waiting(&self) -> Option<&Participant> {
        let rank = self.limit.saturating_add(1);
        self.entries
            .iter()
            .find(|p| !p.withdrawn && p.visible_rank == rank)
    }

    /// Number of non-withdrawn participants inside the cut.
    #[must_use]
    pub fn qualified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|p| p.is_qualified(self.limit))
            .count()
    }

    /// Number of non-withdrawn defending champions.
    #[must_use]
    pub fn active_champions(&self) -> usize {
        self.entries
            .iter()
            .filter(|p| p.is_champion() && !p.withdrawn)
            .count()
    }

    /// Replaces the ordered list and renumbers `total_order` from 1.
    pub(crate) fn reorder(&mut self, entries: Vec<Participant>) {
        self.entries = entries;
        self.renumber_orders();
    }

    /// Removes and returns the participant at `index`.
    pub(crate) fn take(&mut self, index: usize) -> Participant {
        self.entries.remove(index)
    }

    /// Inserts a participant at `index` and renumbers `total_order`.
    pub(crate) fn insert(&mut self, index: usize, participant: Participant) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, participant);
        self.renumber_orders();
    }

    /// Moves the participant at `from` to `to`, shifting the entries in
    /// between by one place, and renumbers `total_order`.
    pub(crate) fn rotate(&mut self, from: usize, to: usize) {
        if from > to {
            self.entries[to..=from].rotate_right(1);
        } else if from < to {
            self.entries[from..=to].rotate_left(1);
        }
        self.renumber_orders();
    }

    /// Assigns `total_order` 1..N in list sequence. Returns the number of
    /// participants whose order changed.
    pub(crate) fn renumber_orders(&mut self) -> usize {
        let mut changed = 0;
        for (index, p) in self.entries.iter_mut().enumerate() {
            let order = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if p.total_order != order {
                p.total_order = order;
                changed += 1;
            }
        }
        changed
    }

    /// Walks the list in order: withdrawn participants get rank 0, the
    /// others the next rank from 1. Returns the number of changed ranks.
    pub(crate) fn recompute_ranks(&mut self) -> usize {
        let mut changed = 0;
        let mut rank = 0;
        for p in &mut self.entries {
            let new_rank = if p.withdrawn {
                0
            } else {
                rank += 1;
                rank
            };
            if p.visible_rank != new_rank {
                p.visible_rank = new_rank;
                changed += 1;
            }
        }
        changed
    }

    /// Participants that differ from the loaded state.
    pub fn changed(&self) -> impl Iterator<Item = &Participant> + '_ {
        self.entries.iter().filter(|p| {
            self.loaded
                .iter()
                .find(|old| old.id == p.id)
                .map_or(true, |old| old != *p)
        })
    }
}
