//! Read-only report commands.

use anyhow::{Context as _, Result};
use qualify_core::model::{ChampionshipId, ClassId, ClassKey, Participant};

use super::Context;

fn status(participant: &Participant, limit: u32) -> &'static str {
    if participant.withdrawn {
        "withdrawn"
    } else if participant.is_qualified(limit) {
        "qualified"
    } else {
        "waiting"
    }
}

/// Show the ordered list of a class.
pub fn standings(ctx: &Context, championship: u64, class: u64) -> Result<()> {
    let key = ClassKey::new(ChampionshipId(championship), ClassId(class));
    let registry = ctx.store.registry();
    let limit = registry.cut_limit(key).context("failed to read cut limit")?;
    let participants = registry
        .get_ordered(key)
        .context("failed to read participants")?;

    if participants.is_empty() {
        println!("No participants in class {key}");
        return Ok(());
    }

    println!("Class {key}, cut limit {limit}");
    println!(
        "{:>5} {:>5} {:>6} {:<24} {:>10} {:<10} {:<10}",
        "ORDER", "RANK", "ID", "NAME", "AVERAGE", "STATUS", "CHAMPION"
    );
    println!("{}", "-".repeat(76));

    for p in &participants {
        let rank = match p.qualified_rank(limit) {
            0 => "-".to_string(),
            rank => rank.to_string(),
        };
        println!(
            "{:>5} {:>5} {:>6} {:<24} {:>10} {:<10} {:<10}",
            p.total_order,
            rank,
            p.id,
            p.name,
            p.average.to_string(),
            status(p, limit),
            p.champion_label
        );
    }

    if let Some(first) = participants
        .iter()
        .find(|p| !p.withdrawn && p.visible_rank == limit + 1)
    {
        println!();
        println!("First waiting: {} '{}'", first.id, first.name);
    }
    Ok(())
}

/// Show ledger records.
pub fn ledger(ctx: &Context, pending: bool, from: u64, limit: u64) -> Result<()> {
    let ledger = ctx.store.ledger();
    let records = ledger
        .read_from(from, limit, pending)
        .context("failed to read ledger")?;

    if records.is_empty() {
        println!("No ledger records");
        return Ok(());
    }

    println!(
        "{:>6} {:<12} {:<16} {:<10} {}",
        "SEQ", "KIND", "REQUESTED BY", "STATE", "MUTATION"
    );
    println!("{}", "-".repeat(80));
    for record in &records {
        println!(
            "{:>6} {:<12} {:<16} {:<10} {}",
            record.seq_id,
            record.mutation.kind().as_str(),
            record.requested_by,
            if record.processed { "processed" } else { "pending" },
            record.mutation
        );
    }

    let pending_count = ledger.pending_count().context("failed to count pending")?;
    println!();
    println!("{pending_count} pending, head {}", ledger.head()?);
    Ok(())
}

/// Show conditions flagged for manual reconciliation.
pub fn flags(ctx: &Context) -> Result<()> {
    let flags = ctx
        .store
        .reconciliation()
        .list()
        .context("failed to read reconciliation flags")?;

    if flags.is_empty() {
        println!("No reconciliation flags");
        return Ok(());
    }

    println!("{:>5} {:>6} {:<8} {:<24} {}", "ID", "SEQ", "CLASS", "KIND", "DETAIL");
    println!("{}", "-".repeat(80));
    for flag in &flags {
        println!(
            "{:>5} {:>6} {:<8} {:<24} {}",
            flag.id,
            flag.seq_id,
            flag.class.map_or_else(|| "-".to_string(), |c| c.to_string()),
            flag.kind,
            flag.detail
        );
    }
    Ok(())
}
