//! Mutation kinds and ledger records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{ChampionshipId, ClassId, ClassKey, ParticipantId};

/// A recorded intent to change the participant registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Position participants from scratch; every class of the championship
    /// when `class` is `None`.
    Initial {
        /// Championship to position.
        championship: ChampionshipId,
        /// Single class to position.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class: Option<ClassId>,
    },
    /// The cut limit of a class changed.
    CutChanged {
        /// Championship of the class.
        championship: ChampionshipId,
        /// Class whose cut changed.
        class: ClassId,
        /// Limit before the change.
        old_limit: u32,
        /// Limit after the change.
        new_limit: u32,
    },
    /// A participant (re-)registered.
    Registered {
        /// The participant.
        participant: ParticipantId,
    },
    /// A participant withdrew.
    Withdrawn {
        /// The participant.
        participant: ParticipantId,
    },
}

impl Mutation {
    /// Returns the kind tag.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Initial { .. } => MutationKind::Initial,
            Self::CutChanged { .. } => MutationKind::CutChanged,
            Self::Registered { .. } => MutationKind::Registered,
            Self::Withdrawn { .. } => MutationKind::Withdrawn,
        }
    }

    /// Target participant of a registration or withdrawal.
    #[must_use]
    pub const fn participant(&self) -> Option<ParticipantId> {
        match self {
            Self::Registered { participant } | Self::Withdrawn { participant } => {
                Some(*participant)
            },
            Self::Initial { .. } | Self::CutChanged { .. } => None,
        }
    }

    /// Target class of a cut change.
    #[must_use]
    pub const fn class_key(&self) -> Option<ClassKey> {
        match self {
            Self::CutChanged {
                championship,
                class,
                ..
            } => Some(ClassKey::new(*championship, *class)),
            Self::Initial {
                championship,
                class: Some(class),
            } => Some(ClassKey::new(*championship, *class)),
            _ => None,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial {
                championship,
                class: None,
            } => write!(f, "initial championship={championship}"),
            Self::Initial {
                championship,
                class: Some(class),
            } => write!(f, "initial championship={championship} class={class}"),
            Self::CutChanged {
                championship,
                class,
                old_limit,
                new_limit,
            } => write!(
                f,
                "cut championship={championship} class={class} {old_limit}->{new_limit}"
            ),
            Self::Registered { participant } => write!(f, "registered participant={participant}"),
            Self::Withdrawn { participant } => write!(f, "withdrawn participant={participant}"),
        }
    }
}

/// The kind tag of a [`Mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// See [`Mutation::Initial`].
    Initial,
    /// See [`Mutation::CutChanged`].
    CutChanged,
    /// See [`Mutation::Registered`].
    Registered,
    /// See [`Mutation::Withdrawn`].
    Withdrawn,
}

impl MutationKind {
    /// Stable string form stored in the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::CutChanged => "cut_changed",
            Self::Registered => "registered",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "cut_changed" => Ok(Self::CutChanged),
            "registered" => Ok(Self::Registered),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(format!("unknown mutation kind: {other}")),
        }
    }
}

/// A mutation as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Monotonic sequence id assigned on append.
    pub seq_id: u64,
    /// The change intent.
    pub mutation: Mutation,
    /// Who requested the change.
    pub requested_by: String,
    /// Whether the worker has applied the mutation.
    pub processed: bool,
    /// Creation time in nanoseconds since the Unix epoch.
    pub created_at_ns: u64,
    /// Time the mutation was applied.
    pub processed_at_ns: Option<u64>,
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged_by_kind() {
        let mutation = Mutation::Withdrawn {
            participant: ParticipantId(7),
        };
        let json = serde_json::to_string(&mutation).unwrap();
        assert_eq!(json, r#"{"kind":"withdrawn","participant":7}"#);
        assert_eq!(
            mutation.kind().as_str().parse::<MutationKind>(),
            Ok(MutationKind::Withdrawn)
        );
    }

    #[test]
    fn test_initial_without_class_omits_field() {
        let mutation = Mutation::Initial {
            championship: ChampionshipId(3),
            class: None,
        };
        let json = serde_json::to_string(&mutation).unwrap();
        assert_eq!(json, r#"{"kind":"initial","championship":3}"#);
        assert_eq!(serde_json::from_str::<Mutation>(&json).unwrap(), mutation);
        assert_eq!(mutation.class_key(), None);
    }

    #[test]
    fn test_targets() {
        let cut = Mutation::CutChanged {
            championship: ChampionshipId(1),
            class: ClassId(2),
            old_limit: 24,
            new_limit: 16,
        };
        assert_eq!(cut.participant(), None);
        assert_eq!(cut.class_key(), Some(ClassKey::new(ChampionshipId(1), ClassId(2))));
        assert_eq!(cut.to_string(), "cut championship=1 class=2 24->16");

        let registered = Mutation::Registered {
            participant: ParticipantId(4),
        };
        assert_eq!(registered.participant(), Some(ParticipantId(4)));
        assert_eq!(registered.kind(), MutationKind::Registered);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!("moved".parse::<MutationKind>().is_err());
    }
}
