//! qualify - Championship qualification operator CLI
//!
//! Enrolls participants, dispatches ranking mutations to the ledger and
//! prints standings. Mutations are applied by `qualifyd`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// qualify - championship qualification operator CLI
#[derive(Parser, Debug)]
#[command(name = "qualify")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides `[store] path`)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by mutating commands.
#[derive(Args, Debug, Clone)]
pub struct MutateArgs {
    /// Requester recorded on the mutation and in participant logbooks
    #[arg(long, default_value = "operator")]
    by: String,

    /// Wait briefly for the worker to apply the mutation
    #[arg(long)]
    wait: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Registry ===
    /// Enroll a participant at the end of its class
    Enroll {
        /// Championship id
        #[arg(long)]
        championship: u64,

        /// Class id
        #[arg(long)]
        class: u64,

        /// Participant name
        #[arg(long)]
        name: String,

        /// Season average
        #[arg(long)]
        average: Decimal,

        /// Champion label, marks the participant as defending champion
        #[arg(long)]
        champion: Option<String>,

        /// Enroll as withdrawn
        #[arg(long)]
        withdrawn: bool,
    },

    // === Mutations ===
    /// Position participants from scratch
    Initial {
        /// Championship id
        #[arg(long)]
        championship: u64,

        /// Class id; all classes of the championship when omitted
        #[arg(long)]
        class: Option<u64>,

        #[command(flatten)]
        mutate: MutateArgs,
    },

    /// Change the cut limit of a class
    Cut {
        /// Championship id
        #[arg(long)]
        championship: u64,

        /// Class id
        #[arg(long)]
        class: u64,

        /// New number of qualifying places
        #[arg(long)]
        limit: u32,

        #[command(flatten)]
        mutate: MutateArgs,
    },

    /// Withdraw a participant
    Withdraw {
        /// Participant id
        #[arg(long)]
        participant: u64,

        #[command(flatten)]
        mutate: MutateArgs,
    },

    /// Register or re-register a participant
    Register {
        /// Participant id
        #[arg(long)]
        participant: u64,

        #[command(flatten)]
        mutate: MutateArgs,
    },

    // === Reports ===
    /// Show the ordered list of a class
    Standings {
        /// Championship id
        #[arg(long)]
        championship: u64,

        /// Class id
        #[arg(long)]
        class: u64,
    },

    /// Show ledger records
    Ledger {
        /// Only records the worker has not applied yet
        #[arg(long)]
        pending: bool,

        /// Start after this sequence id
        #[arg(long, default_value = "0")]
        from: u64,

        /// Maximum number of records
        #[arg(short = 'n', long, default_value = "50")]
        limit: u64,
    },

    /// Show conditions flagged for manual reconciliation
    Flags,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let ctx = commands::Context::open(cli.config.as_deref(), cli.db.as_deref())?;

    match cli.command {
        Commands::Enroll {
            championship,
            class,
            name,
            average,
            champion,
            withdrawn,
        } => commands::registry::enroll(
            &ctx,
            championship,
            class,
            &name,
            average,
            champion,
            withdrawn,
        ),
        Commands::Initial {
            championship,
            class,
            mutate,
        } => commands::mutate::initial(&ctx, championship, class, &mutate),
        Commands::Cut {
            championship,
            class,
            limit,
            mutate,
        } => commands::mutate::cut(&ctx, championship, class, limit, &mutate),
        Commands::Withdraw {
            participant,
            mutate,
        } => commands::mutate::withdraw(&ctx, participant, &mutate),
        Commands::Register {
            participant,
            mutate,
        } => commands::mutate::register(&ctx, participant, &mutate),
        Commands::Standings {
            championship,
            class,
        } => commands::report::standings(&ctx, championship, class),
        Commands::Ledger {
            pending,
            from,
            limit,
        } => commands::report::ledger(&ctx, pending, from, limit),
        Commands::Flags => commands::report::flags(&ctx),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cut_with_wait() {
        let cli = Cli::try_parse_from([
            "qualify",
            "--db",
            "q.db",
            "cut",
            "--championship",
            "1",
            "--class",
            "2",
            "--limit",
            "16",
            "--by",
            "secretary",
            "--wait",
        ])
        .unwrap();
        match cli.command {
            Commands::Cut {
                championship,
                class,
                limit,
                mutate,
            } => {
                assert_eq!((championship, class, limit), (1, 2, 16));
                assert_eq!(mutate.by, "secretary");
                assert!(mutate.wait);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_enroll_average() {
        let cli = Cli::try_parse_from([
            "qualify",
            "enroll",
            "--championship",
            "1",
            "--class",
            "1",
            "--name",
            "Jansen",
            "--average",
            "7.125",
        ])
        .unwrap();
        match cli.command {
            Commands::Enroll { average, champion, .. } => {
                assert_eq!(average, Decimal::new(7125, 3));
                assert!(champion.is_none());
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
