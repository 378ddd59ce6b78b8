//! Registry setup commands.

use anyhow::{Context as _, Result};
use qualify_core::model::{ChampionshipId, ClassId, ClassKey, NewParticipant};
use rust_decimal::Decimal;

use super::Context;

/// Enroll a participant at the end of its class.
///
/// The participant takes no place until an `initial` or `register`
/// mutation positions it.
pub fn enroll(
    ctx: &Context,
    championship: u64,
    class: u64,
    name: &str,
    average: Decimal,
    champion: Option<String>,
    withdrawn: bool,
) -> Result<()> {
    let key = ClassKey::new(ChampionshipId(championship), ClassId(class));
    let mut new = NewParticipant::new(key, name, average).with_withdrawn(withdrawn);
    if let Some(label) = champion {
        new = new.with_champion_label(label);
    }

    let participant = ctx
        .store
        .registry()
        .enroll(&new)
        .context("failed to enroll participant")?;

    println!(
        "Enrolled participant {} '{}' in class {} at position {}",
        participant.id, participant.name, key, participant.total_order
    );
    Ok(())
}
