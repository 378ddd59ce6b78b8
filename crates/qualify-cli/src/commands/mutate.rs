//! Mutation commands.
//!
//! Each command appends one mutation through a detached dispatcher. The
//! `qualifyd` worker notices it on its next poll; with `--wait` the command
//! polls the record for a few seconds before reporting it as pending.

use anyhow::{Context as _, Result, bail};
use qualify_core::ledger::{Mutation, MutationRecord};
use qualify_core::model::{ChampionshipId, ClassId, ParticipantId};
use qualify_daemon::dispatcher::{DispatchError, Dispatcher, DispatcherConfig};

use super::Context;
use crate::MutateArgs;

/// Position participants from scratch.
pub fn initial(
    ctx: &Context,
    championship: u64,
    class: Option<u64>,
    args: &MutateArgs,
) -> Result<()> {
    request(
        ctx,
        Mutation::Initial {
            championship: ChampionshipId(championship),
            class: class.map(ClassId),
        },
        args,
    )
}

/// Change the cut limit of a class.
pub fn cut(
    ctx: &Context,
    championship: u64,
    class: u64,
    limit: u32,
    args: &MutateArgs,
) -> Result<()> {
    request(
        ctx,
        Mutation::CutChanged {
            championship: ChampionshipId(championship),
            class: ClassId(class),
            // Replaced by the stored limit during validation.
            old_limit: 0,
            new_limit: limit,
        },
        args,
    )
}

/// Withdraw a participant.
pub fn withdraw(ctx: &Context, participant: u64, args: &MutateArgs) -> Result<()> {
    request(
        ctx,
        Mutation::Withdrawn {
            participant: ParticipantId(participant),
        },
        args,
    )
}

/// Register or re-register a participant.
pub fn register(ctx: &Context, participant: u64, args: &MutateArgs) -> Result<()> {
    request(
        ctx,
        Mutation::Registered {
            participant: ParticipantId(participant),
        },
        args,
    )
}

fn request(ctx: &Context, mutation: Mutation, args: &MutateArgs) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let dispatcher =
        Dispatcher::detached(ctx.store.clone(), DispatcherConfig::from_config(&ctx.config));
    let record = match rt.block_on(dispatcher.request_mutation(mutation, &args.by, args.wait)) {
        Ok(record) => record,
        Err(DispatchError::Validation(reason)) => bail!("mutation rejected: {reason}"),
        Err(e) => return Err(e).context("failed to dispatch mutation"),
    };

    print_record(&record, args.wait);
    Ok(())
}

fn print_record(record: &MutationRecord, waited: bool) {
    let state = if record.processed {
        "processed"
    } else if waited {
        "pending (worker has not applied it yet)"
    } else {
        "queued"
    };
    println!("Mutation #{} {}: {}", record.seq_id, record.mutation, state);
}
