// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cowork - operator CLI for the coworking reservation core.
//!
//! Checks slot availability against the live database, runs the expiry
//! sweep (meant for cron), inspects a user's confirmation state and prints
//! the effective configuration.

mod check;
mod pending;
mod sweep;

use std::io::IsTerminal;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use cowork_config::CoworkConfig;
use cowork_core::{CoworkError, ServiceType};
use cowork_storage::Database;

/// Cowork - reservation core for a coworking booking assistant.
#[derive(Parser, Debug)]
#[command(name = "cowork", version, about, long_about = None)]
struct Cli {
    /// Load this configuration file instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a slot can be booked.
    Check {
        /// Local date, YYYY-MM-DD.
        #[arg(long)]
        date: NaiveDate,
        /// Local start time, HH:MM.
        #[arg(long, value_parser = parse_hhmm)]
        start: NaiveTime,
        /// Duration in hours (fractions allowed).
        #[arg(long, default_value_t = 1.0)]
        hours: f64,
        /// desk, meeting-room or private-office.
        #[arg(long, default_value = "desk")]
        service: ServiceType,
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Delete expired pending confirmations and clear expired cooldowns.
    Sweep {
        #[arg(long)]
        json: bool,
    },
    /// Show a user's pending confirmation and cooldown state.
    Pending {
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| format!("expected HH:MM, got `{raw}`: {e}"))
}

/// Opens the configured database and syncs the capacity table.
pub(crate) async fn open_database(config: &CoworkConfig) -> Result<Database, CoworkError> {
    let db = Database::open_with(&config.storage).await?;
    db.seed_capacity(&config.capacity).await?;
    Ok(db)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cowork={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_config(config: &CoworkConfig) -> Result<(), CoworkError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| CoworkError::Internal(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => cowork_config::load_and_validate_path(path),
        None => cowork_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            cowork_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Commands::Check {
            date,
            start,
            hours,
            service,
            json,
            plain,
        } => {
            if plain || !std::io::stdout().is_terminal() {
                colored::control::set_override(false);
            }
            check::run_check(&config, date, start, hours, service, json).await
        }
        Commands::Sweep { json } => sweep::run_sweep(&config, json).await,
        Commands::Pending { user, json } => pending::run_pending(&config, &user, json).await,
        Commands::Config => print_config(&config),
    };

    if let Err(e) = result {
        eprintln!("cowork: {e}");
        std::process::exit(1);
    }
}
