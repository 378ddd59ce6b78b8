//! Core domain types shared by the registry, ranking engine and ledger.
//!
//! A [`Participant`] belongs to exactly one class of one championship. Within
//! that scope the participants carry a dense `total_order` (1..N) and a
//! derived `visible_rank` where withdrawn participants have rank 0.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cut limit applied to a class that has no explicit limit stored.
pub const DEFAULT_CUT_LIMIT: u32 = 24;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifies a qualification stage (a regional instance or the national one).
    ChampionshipId
);
id_type!(
    /// Opaque competition class key.
    ClassId
);
id_type!(
    /// Identifies a participant row.
    ParticipantId
);

/// The scope of one ranking list: a class within a championship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassKey {
    /// Owning championship.
    pub championship: ChampionshipId,
    /// Competition class.
    pub class: ClassId,
}

impl ClassKey {
    /// Creates a new class key.
    #[must_use]
    pub const fn new(championship: ChampionshipId, class: ClassId) -> Self {
        Self {
            championship,
            class,
        }
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.championship, self.class)
    }
}

/// A participant in a championship class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Row identity.
    pub id: ParticipantId,
    /// Championship this participant qualifies in.
    pub championship: ChampionshipId,
    /// Competition class this participant is ranked in.
    pub class: ClassId,
    /// Display name.
    pub name: String,
    /// Average score computed upstream.
    pub average: Decimal,
    /// Dense position within the class, starting at 1.
    pub total_order: u32,
    /// Externally shown rank; 0 while withdrawn.
    pub visible_rank: u32,
    /// Non-empty for defending champions, who are exempt from the cut.
    pub champion_label: String,
    /// Whether the participant has withdrawn.
    pub withdrawn: bool,
    /// Whether participation has been confirmed.
    pub confirmed: bool,
    /// Timestamped notes describing every mutation applied to this participant.
    pub logbook: String,
}

impl Participant {
    /// Returns the ranking scope of this participant.
    #[must_use]
    pub const fn class_key(&self) -> ClassKey {
        ClassKey::new(self.championship, self.class)
    }

    /// Returns true for a defending champion.
    #[must_use]
    pub fn is_champion(&self) -> bool {
        !self.champion_label.is_empty()
    }

    /// Returns true when the participant holds one of the `limit` qualified places.
    #[must_use]
    pub const fn is_qualified(&self, limit: u32) -> bool {
        !self.withdrawn && self.visible_rank >= 1 && self.visible_rank <= limit
    }

    /// Rank as shown on a qualification list: the visible rank inside the
    /// cut, 0 for waiting and withdrawn participants.
    #[must_use]
    pub const fn qualified_rank(&self, limit: u32) -> u32 {
        if self.is_qualified(limit) {
            self.visible_rank
        } else {
            0
        }
    }

    /// Appends a stamped line to the logbook.
    pub fn note(&mut self, stamp: &str, message: &str) {
        self.logbook.push('[');
        self.logbook.push_str(stamp);
        self.logbook.push_str("] ");
        self.logbook.push_str(message);
        self.logbook.push('\n');
    }
}

/// Input for enrolling a participant into a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    /// Championship to enroll in.
    pub championship: ChampionshipId,
    /// Class to enroll in.
    pub class: ClassId,
    /// Display name.
    pub name: String,
    /// Average score.
    pub average: Decimal,
    /// Champion label, empty for ordinary participants.
    #[serde(default)]
    pub champion_label: String,
    /// Enrolled as withdrawn.
    #[serde(default)]
    pub withdrawn: bool,
    /// Enrolled as confirmed.
    #[serde(default)]
    pub confirmed: bool,
}

impl NewParticipant {
    /// Creates an unconfirmed, non-champion enrollment.
    #[must_use]
    pub fn new(key: ClassKey, name: impl Into<String>, average: Decimal) -> Self {
        Self {
            championship: key.championship,
            class: key.class,
            name: name.into(),
            average,
            champion_label: String::new(),
            withdrawn: false,
            confirmed: false,
        }
    }

    /// Marks the enrollment as a defending champion.
    #[must_use]
    pub fn with_champion_label(mut self, label: impl Into<String>) -> Self {
        self.champion_label = label.into();
        self
    }

    /// Sets the withdrawn flag.
    #[must_use]
    pub const fn with_withdrawn(mut self, withdrawn: bool) -> Self {
        self.withdrawn = withdrawn;
        self
    }

    /// Sets the confirmed flag.
    #[must_use]
    pub const fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    /// Returns the ranking scope of the enrollment.
    #[must_use]
    pub const fn class_key(&self) -> ClassKey {
        ClassKey::new(self.championship, self.class)
    }
}

#[cfg(test)]
mod unit_tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn participant(rank: u32, withdrawn: bool) -> Participant {
        Participant {
            id: ParticipantId(1),
            championship: ChampionshipId(1),
            class: ClassId(1),
            name: "A".to_string(),
            average: dec!(9.0),
            total_order: 1,
            visible_rank: rank,
            champion_label: String::new(),
            withdrawn,
            confirmed: false,
            logbook: String::new(),
        }
    }

    #[test]
    fn test_qualified_rank_hides_waiting_participants() {
        assert_eq!(participant(2, false).qualified_rank(2), 2);
        assert_eq!(participant(3, false).qualified_rank(2), 0);
        assert_eq!(participant(0, true).qualified_rank(2), 0);
    }

    #[test]
    fn test_note_appends_stamped_line() {
        let mut p = participant(1, false);
        p.note("2026-10-18 12:00", "confirmed");
        p.note("2026-10-18 12:05", "withdrawn");
        assert_eq!(
            p.logbook,
            "[2026-10-18 12:00] confirmed\n[2026-10-18 12:05] withdrawn\n"
        );
    }

    #[test]
    fn test_class_key_display() {
        let key = ClassKey::new(ChampionshipId(3), ClassId(7));
        assert_eq!(key.to_string(), "3/7");
    }
}
