//! Ranking algorithms over [`ClassStandings`].
//!
//! Every operation works on a class list loaded with one batch read and
//! leaves it with a dense `total_order` and a `visible_rank` recomputed by
//! the order walk. The caller persists [`ClassStandings::changed`].

use std::cmp::Reverse;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

use super::standings::{ClassStandings, ConsistencyIssue};
use crate::model::{ClassKey, Participant, ParticipantId};

/// Errors returned by the ranking operations.
#[derive(Debug, Error)]
pub enum RankingError {
    /// The participant is not part of the loaded class.
    #[error("participant {id} is not ranked in class {key}")]
    NotInClass {
        /// The participant.
        id: ParticipantId,
        /// The class that was loaded.
        key: ClassKey,
    },
}

/// Who requested a mutation and when, for logbook notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Requester shown in the logbook.
    pub requested_by: String,
    /// Local time stamp, `YYYY-MM-DD HH:MM`.
    pub stamp: String,
}

impl Attribution {
    /// Attribution stamped with the current local time.
    #[must_use]
    pub fn now(requested_by: impl Into<String>) -> Self {
        Self {
            requested_by: requested_by.into(),
            stamp: Local::now().format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    /// Attribution with a fixed stamp.
    #[must_use]
    pub fn at(requested_by: impl Into<String>, stamp: impl Into<String>) -> Self {
        Self {
            requested_by: requested_by.into(),
            stamp: stamp.into(),
        }
    }
}

/// Where a registration placed the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Already participating; only the confirmation changed.
    Confirmed,
    /// Inserted directly among the qualified participants.
    Direct,
    /// Inserted into the waiting pool.
    Waiting,
}

/// Result of a ranking operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankingOutcome {
    /// Invariant surprises to flag for reconciliation.
    pub issues: Vec<ConsistencyIssue>,
    /// The waiting participant promoted by a withdrawal.
    pub promoted: Option<ParticipantId>,
    /// Placement chosen by a registration.
    pub placement: Option<Placement>,
}

/// Full recompute of the qualified list.
///
/// Champions are admitted regardless of the cut; the remaining places go to
/// non-champions by descending average. Admitted participants are ordered
/// by average with champions interleaved, followed by everyone else by
/// average. Withdrawn non-champions encountered before the cut fills keep
/// their place in the admitted block without taking a place.
pub fn determine_participants(standings: &mut ClassStandings) -> RankingOutcome {
    let limit = standings.limit() as usize;
    let key = |p: &Participant| (Reverse(p.average), p.total_order);

    let (mut admitted, mut others): (Vec<_>, Vec<_>) = standings
        .entries()
        .iter()
        .cloned()
        .partition(Participant::is_champion);
    others.sort_by_key(key);

    let champions = admitted.iter().filter(|p| !p.withdrawn).count();
    let mut taken = champions;
    let mut rest = Vec::new();
    for p in others {
        if taken < limit {
            if !p.withdrawn {
                taken += 1;
            }
            admitted.push(p);
        } else {
            rest.push(p);
        }
    }
    admitted.sort_by_key(key);

    debug!(
        class = %standings.key(),
        limit,
        champions,
        admitted = admitted.len(),
        waiting = rest.len(),
        "determined participants"
    );

    admitted.extend(rest);
    standings.reorder(admitted);
    standings.recompute_ranks();

    let mut outcome = RankingOutcome::default();
    if champions > limit {
        outcome.issues.push(ConsistencyIssue::ChampionsExceedLimit {
            champions,
            limit: standings.limit(),
        });
    }
    outcome
}

/// Applies a new cut limit and recomputes the qualified list.
pub fn change_cut(standings: &mut ClassStandings, new_limit: u32) -> RankingOutcome {
    info!(
        class = %standings.key(),
        old_limit = standings.limit(),
        new_limit,
        "changing cut"
    );
    standings.set_limit(new_limit);
    determine_participants(standings)
}

/// Withdraws a participant.
///
/// The participant keeps its `total_order`. When the withdrawal vacates a
/// qualified place, the first waiting participant is promoted: it moves in
/// front of the best-ordered qualified participant with a strictly lower
/// average, if there is one, and otherwise keeps its position.
///
/// # Errors
///
/// Returns [`RankingError::NotInClass`] if the participant is not part of
/// the loaded class.
pub fn withdraw(
    standings: &mut ClassStandings,
    id: ParticipantId,
    by: &Attribution,
) -> Result<RankingOutcome, RankingError> {
    let key = standings.key();
    let limit = standings.limit();
    let participant = standings
        .get_mut(id)
        .ok_or(RankingError::NotInClass { id, key })?;

    if participant.withdrawn {
        participant.note(
            &by.stamp,
            &format!("Withdrawal from {} received while already withdrawn", by.requested_by),
        );
        info!(participant = %id, class = %key, "participant already withdrawn");
        return Ok(RankingOutcome::default());
    }

    let withdrawn_order = participant.total_order;
    info!(
        participant = %id,
        class = %key,
        rank = participant.visible_rank,
        order = withdrawn_order,
        "withdrawing participant"
    );
    participant.withdrawn = true;
    participant.visible_rank = 0;
    participant.note(
        &by.stamp,
        &format!("Withdrawn at the request of {}", by.requested_by),
    );

    let mut outcome = RankingOutcome::default();

    let Some((waiting_id, waiting_order, waiting_average)) = standings
        .first_waiting()
        .map(|p| (p.id, p.total_order, p.average))
    else {
        debug!(class = %key, limit, "no waiting participant to promote");
        standings.recompute_ranks();
        return Ok(outcome);
    };

    if withdrawn_order < waiting_order {
        let slot = standings
            .entries()
            .iter()
            .position(|p| p.is_qualified(limit) && p.average < waiting_average);
        if let (Some(slot), Some(from)) = (slot, standings.position(waiting_id)) {
            standings.rotate(from, slot);
        }
        if let Some(promoted) = standings.get_mut(waiting_id) {
            info!(
                participant = %waiting_id,
                class = %key,
                order = promoted.total_order,
                "promoting first waiting participant"
            );
            promoted.note(&by.stamp, "Promoted from the waiting list");
        }
        outcome.promoted = Some(waiting_id);
    }

    standings.recompute_ranks();
    Ok(outcome)
}

/// Registers a participant.
///
/// A participant that is not withdrawn is only confirmed. A withdrawn
/// participant is removed from its old place and inserted again: directly
/// among the qualified participants when places are free, otherwise into
/// the waiting pool. A champion goes after the last waiting champion with
/// a strictly higher average; anyone else after the last waiting
/// participant with a strictly higher average; without such an anchor the
/// participant heads the waiting pool.
///
/// # Errors
///
/// Returns [`RankingError::NotInClass`] if the participant is not part of
/// the loaded class.
pub fn register(
    standings: &mut ClassStandings,
    id: ParticipantId,
    by: &Attribution,
) -> Result<RankingOutcome, RankingError> {
    let key = standings.key();
    let limit = standings.limit();
    let index = standings
        .position(id)
        .ok_or(RankingError::NotInClass { id, key })?;

    let mut outcome = RankingOutcome::default();

    if !standings.entries()[index].withdrawn {
        if let Some(participant) = standings.get_mut(id) {
            participant.note(&by.stamp, &format!("Mutation by {}", by.requested_by));
            participant.confirmed = true;
            participant.note(&by.stamp, "Participation confirmed");
        }
        info!(participant = %id, class = %key, "participation confirmed");
        outcome.placement = Some(Placement::Confirmed);
        return Ok(outcome);
    }

    let mut participant = standings.take(index);
    participant.note(&by.stamp, &format!("Mutation by {}", by.requested_by));

    let entries = standings.entries();
    let (insert_at, placement) = if standings.qualified_count() < limit as usize {
        let at = entries
            .iter()
            .rposition(|p| p.average > participant.average)
            .map_or(0, |i| i + 1);
        participant.note(&by.stamp, "Admitted directly to the qualified list");
        (at, Placement::Direct)
    } else {
        let waiting = |p: &Participant| !p.withdrawn && p.visible_rank > limit;
        let anchor = if participant.is_champion() {
            entries.iter().rposition(|p| {
                waiting(p) && p.is_champion() && p.average > participant.average
            })
        } else {
            entries
                .iter()
                .rposition(|p| waiting(p) && p.average > participant.average)
        };
        let at = anchor.map_or_else(
            || entries.iter().position(waiting).unwrap_or(entries.len()),
            |i| i + 1,
        );
        participant.note(&by.stamp, "Moved to the waiting list");
        (at, Placement::Waiting)
    };

    info!(
        participant = %id,
        class = %key,
        old_order = participant.total_order,
        new_order = insert_at + 1,
        ?placement,
        "re-registering participant"
    );

    participant.withdrawn = false;
    participant.confirmed = true;
    participant.note(&by.stamp, "Participation confirmed");
    standings.insert(insert_at, participant);
    standings.recompute_ranks();

    outcome.placement = Some(placement);
    Ok(outcome)
}
