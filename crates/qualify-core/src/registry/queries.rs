//! Connection-level participant and cut-limit queries.
//!
//! These functions take a plain [`Connection`] so the mutation processor can
//! run them inside the same transaction that marks a mutation processed.
//! [`super::Registry`] wraps them for standalone use.

// SQLite returns i64 for row IDs and integers, but they're always non-negative.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;

use super::RegistryError;
use crate::model::{
    ChampionshipId, ClassId, ClassKey, NewParticipant, Participant, ParticipantId,
};
use crate::ranking::{ClassStandings, ConsistencyIssue};

const PARTICIPANT_COLUMNS: &str = "id, championship, class, name, average, total_order, \
     visible_rank, champion_label, withdrawn, confirmed, logbook";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    let average: String = row.get(4)?;
    let average = Decimal::from_str(&average)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Participant {
        id: ParticipantId(row.get::<_, i64>(0)? as u64),
        championship: ChampionshipId(row.get::<_, i64>(1)? as u64),
        class: ClassId(row.get::<_, i64>(2)? as u64),
        name: row.get(3)?,
        average,
        total_order: row.get::<_, i64>(5)? as u32,
        visible_rank: row.get::<_, i64>(6)? as u32,
        champion_label: row.get(7)?,
        withdrawn: row.get(8)?,
        confirmed: row.get(9)?,
        logbook: row.get(10)?,
    })
}

/// Inserts a participant at the end of its class order.
///
/// A non-withdrawn participant takes the next visible rank so the class
/// stays dense until the next full recompute positions it by average.
pub fn insert_participant(
    conn: &Connection,
    new: &NewParticipant,
) -> Result<ParticipantId, RegistryError> {
    let (max_order, max_rank): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT MAX(total_order), MAX(visible_rank) FROM participants
         WHERE championship = ?1 AND class = ?2",
        params![new.championship.0 as i64, new.class.0 as i64],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let total_order = max_order.unwrap_or(0) + 1;
    let visible_rank = if new.withdrawn {
        0
    } else {
        max_rank.unwrap_or(0) + 1
    };

    conn.execute(
        "INSERT INTO participants
             (championship, class, name, average, total_order, visible_rank,
              champion_label, withdrawn, confirmed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.championship.0 as i64,
            new.class.0 as i64,
            new.name,
            new.average.normalize().to_string(),
            total_order,
            visible_rank,
            new.champion_label,
            new.withdrawn,
            new.confirmed,
        ],
    )?;

    Ok(ParticipantId(conn.last_insert_rowid() as u64))
}

/// Loads one participant.
pub fn load_participant(conn: &Connection, id: ParticipantId) -> Result<Participant, RegistryError> {
    let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1");
    conn.query_row(&sql, params![id.0 as i64], participant_from_row)
        .optional()?
        .ok_or(RegistryError::NotFound { id })
}

/// Loads every participant of a class ordered by `total_order`.
pub fn load_ordered(conn: &Connection, key: ClassKey) -> Result<Vec<Participant>, RegistryError> {
    let sql = format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants
         WHERE championship = ?1 AND class = ?2
         ORDER BY total_order ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![key.championship.0 as i64, key.class.0 as i64],
        participant_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Loads the defending champions of a class, withdrawn or not.
pub fn load_champions(
    conn: &Connection,
    key: ClassKey,
) -> Result<Vec<Participant>, RegistryError> {
    let sql = format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants
         WHERE championship = ?1 AND class = ?2 AND champion_label != ''
         ORDER BY total_order ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![key.championship.0 as i64, key.class.0 as i64],
        participant_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn expect_one(changed: usize, id: ParticipantId) -> Result<(), RegistryError> {
    if changed == 0 {
        return Err(RegistryError::NotFound { id });
    }
    Ok(())
}

/// Sets `total_order` of one participant.
pub fn update_order(
    conn: &Connection,
    id: ParticipantId,
    total_order: u32,
) -> Result<(), RegistryError> {
    let changed = conn.execute(
        "UPDATE participants SET total_order = ?1 WHERE id = ?2",
        params![total_order, id.0 as i64],
    )?;
    expect_one(changed, id)
}

/// Sets `visible_rank` of one participant.
pub fn update_rank(
    conn: &Connection,
    id: ParticipantId,
    visible_rank: u32,
) -> Result<(), RegistryError> {
    let changed = conn.execute(
        "UPDATE participants SET visible_rank = ?1 WHERE id = ?2",
        params![visible_rank, id.0 as i64],
    )?;
    expect_one(changed, id)
}

/// Shifts `total_order` by `delta` for every participant of the class at or
/// after `from_inclusive`. Returns the number of shifted rows.
pub fn shift_order(
    conn: &Connection,
    key: ClassKey,
    from_inclusive: u32,
    delta: i64,
) -> Result<usize, RegistryError> {
    let changed = conn.execute(
        "UPDATE participants SET total_order = total_order + ?1
         WHERE championship = ?2 AND class = ?3 AND total_order >= ?4",
        params![
            delta,
            key.championship.0 as i64,
            key.class.0 as i64,
            from_inclusive
        ],
    )?;
    Ok(changed)
}

/// Writes the mutable ranking fields of a participant.
pub fn save_participant(conn: &Connection, participant: &Participant) -> Result<(), RegistryError> {
    let changed = conn.execute(
        "UPDATE participants
         SET total_order = ?1, visible_rank = ?2, withdrawn = ?3, confirmed = ?4, logbook = ?5
         WHERE id = ?6",
        params![
            participant.total_order,
            participant.visible_rank,
            participant.withdrawn,
            participant.confirmed,
            participant.logbook,
            participant.id.0 as i64,
        ],
    )?;
    expect_one(changed, participant.id)
}

/// Returns the cut limit of a class, or `default` when none is stored.
pub fn load_cut_limit(conn: &Connection, key: ClassKey, default: u32) -> Result<u32, RegistryError> {
    let limit: Option<i64> = conn
        .query_row(
            "SELECT cut_limit FROM cut_limits WHERE championship = ?1 AND class = ?2",
            params![key.championship.0 as i64, key.class.0 as i64],
            |row| row.get(0),
        )
        .optional()?;
    Ok(limit.map_or(default, |l| l as u32))
}

/// Stores the cut limit of a class. A limit equal to `default` removes the
/// stored row.
pub fn store_cut_limit(
    conn: &Connection,
    key: ClassKey,
    limit: u32,
    default: u32,
) -> Result<(), RegistryError> {
    if limit == 0 {
        return Err(RegistryError::InvalidCutLimit { limit });
    }

    if limit == default {
        conn.execute(
            "DELETE FROM cut_limits WHERE championship = ?1 AND class = ?2",
            params![key.championship.0 as i64, key.class.0 as i64],
        )?;
    } else {
        conn.execute(
            "INSERT OR REPLACE INTO cut_limits (championship, class, cut_limit)
             VALUES (?1, ?2, ?3)",
            params![key.championship.0 as i64, key.class.0 as i64, limit],
        )?;
    }
    Ok(())
}

/// Returns true when the class has participants or a stored cut limit.
pub fn class_exists(conn: &Connection, key: ClassKey) -> Result<bool, RegistryError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM participants WHERE championship = ?1 AND class = ?2)
             OR EXISTS (SELECT 1 FROM cut_limits WHERE championship = ?1 AND class = ?2)",
        params![key.championship.0 as i64, key.class.0 as i64],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Returns the classes of a championship that have participants, ascending.
pub fn classes(conn: &Connection, championship: ChampionshipId) -> Result<Vec<ClassId>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT class FROM participants WHERE championship = ?1 ORDER BY class ASC",
    )?;
    let rows = stmt.query_map(params![championship.0 as i64], |row| {
        Ok(ClassId(row.get::<_, i64>(0)? as u64))
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Loads the ordered list and cut limit of a class in one batch read.
pub fn load_standings(
    conn: &Connection,
    key: ClassKey,
    default_limit: u32,
) -> Result<(ClassStandings, Vec<ConsistencyIssue>), RegistryError> {
    let limit = load_cut_limit(conn, key, default_limit)?;
    let entries = load_ordered(conn, key)?;
    Ok(ClassStandings::load(key, limit, entries))
}

/// Writes every participant that changed since the standings were loaded.
/// Returns the number of written participants.
pub fn save_standings(conn: &Connection, standings: &ClassStandings) -> Result<usize, RegistryError> {
    let mut written = 0;
    for participant in standings.changed() {
        save_participant(conn, participant)?;
        written += 1;
    }
    Ok(written)
}
