//! # drl-migrate CLI
//!
//! ```bash
//! drl-migrate --config ./config/drl-migrate.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `drl-migrate migrate collection <id>` | Migrate every item of a legacy collection |
//! | `drl-migrate migrate item <id>` | Migrate a single item |
//! | `drl-migrate check` | Verify legacy database, repository, encoder and scratch dir |
//!
//! `--dry-run` prints the plan for each item without contacting the
//! repository. Logging goes to stderr (`RUST_LOG`, default `info`); the run
//! summary goes to stdout. The exit code is 1 when any item failed or was
//! left incomplete.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drl_migrate::progress::ProgressMode;
use drl_migrate::{check, config, migrate};

/// Migrate legacy DRL items into a Fedora repository.
#[derive(Parser)]
#[command(name = "drl-migrate", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/drl-migrate.toml")]
    config: PathBuf,

    /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate a collection or a single item.
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },

    /// Check that the legacy database, repository, encoder and scratch
    /// directory are usable.
    Check,
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Every item whose primary collection is `id`, in item id order.
    Collection {
        id: String,

        /// Print the plan without writing to the repository.
        #[arg(long)]
        dry_run: bool,
    },

    /// One item by its digital object id.
    Item {
        id: String,

        /// Print the plan without writing to the repository.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    let ok = match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Collection { id, dry_run } => {
                migrate::run_collection(&cfg, &id, dry_run, progress).await?
            }
            MigrateTarget::Item { id, dry_run } => migrate::run_item(&cfg, &id, dry_run).await?,
        },
        Commands::Check => check::run_check(&cfg).await?,
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
