//! Operator tool over the pawnshop core
//!
//! Validates engine configs and ledger snapshots and prints day-end totals.
//! Log level comes from `PAWNSHOP_LOG` (default `info`).

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pawnshop_core_rs::core::money::format_minor_units;
use pawnshop_core_rs::{EngineConfig, PawnEngine, PledgeStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pawnshop", version, about = "Pawnshop ledger tools")]
struct Cli {
    /// Engine config JSON; defaults apply when omitted
    #[arg(long, global = true, env = "PAWNSHOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse and validate a config, printing its hash
    ValidateConfig,

    /// Load a snapshot under the config and summarise it
    ValidateSnapshot {
        snapshot: PathBuf,
    },

    /// Print a branch's totals for one business date as JSON
    DayTotals {
        snapshot: PathBuf,

        #[arg(long)]
        branch: String,

        /// Business date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("PAWNSHOP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            EngineConfig::from_json_str(&json).with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_engine(config: EngineConfig, snapshot: &Path) -> Result<PawnEngine> {
    let json = std::fs::read_to_string(snapshot)
        .with_context(|| format!("reading snapshot {}", snapshot.display()))?;
    PawnEngine::load_snapshot(config, &json).with_context(|| format!("invalid snapshot {}", snapshot.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::ValidateConfig => {
            println!("config ok, hash {}", config.config_hash()?);
        }

        Command::ValidateSnapshot { snapshot } => {
            let engine = load_engine(config, &snapshot)?;
            let ledger = engine.ledger()?;

            let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
            for pledge in ledger.pledges() {
                *by_status.entry(pledge.status().as_str()).or_default() += 1;
            }
            let outstanding: i64 = ledger
                .pledges()
                .filter(|p| p.status().is_open() || p.status() == PledgeStatus::Forfeited)
                .map(|p| p.outstanding_principal())
                .sum();
            let occupied = ledger.storage().slots().filter(|s| s.is_occupied).count();

            println!("snapshot ok");
            println!("pledges: {}", ledger.num_pledges());
            for (status, count) in by_status {
                println!("  {:<10} {}", status, count);
            }
            println!("items: {}", ledger.items().len());
            println!("occupied slots: {}", occupied);
            println!("outstanding principal: {}", format_minor_units(outstanding));
        }

        Command::DayTotals { snapshot, branch, date } => {
            let engine = load_engine(config, &snapshot)?;
            let totals = engine.aggregate_day(&branch, date)?;
            info!(branch = %branch, %date, closed = engine.is_day_closed(&branch, date)?, "Day totals computed");
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }

    Ok(())
}
