//! Desktop-automation pilot.
//!
//! Watches a root of git repositories, selects one planned task per cycle,
//! and delivers it to an allow-listed desktop window through a guarded
//! automation adapter. Every node of the cycle is checkpointed, so the
//! watchdog can resume an interrupted run without repeating mutations.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pilot::core::state::RunPhase;
use pilot::exit_codes;
use pilot::io::config::{Settings, load_settings};
use pilot::logging;
use pilot::run::{self, RunOutcome};

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Deterministic pilot for a desktop-automation deployment"
)]
struct Cli {
    /// Settings file (missing file means defaults).
    #[arg(long, global = true, default_value = "pilot.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one full cycle and exit.
    RunOnce {
        /// Dispatch mutations instead of dry-running them.
        #[arg(long)]
        write_mode: bool,
        /// Replace the configured target allow-list (repeatable).
        #[arg(long = "allow")]
        allow: Vec<String>,
    },
    /// Run cycles continuously on an interval.
    RunLoop {
        /// Seconds between cycles.
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        /// Stop after this many cycles (mainly for smoke tests).
        #[arg(long)]
        max_cycles: Option<u32>,
        /// Dispatch mutations instead of dry-running them.
        #[arg(long)]
        write_mode: bool,
        /// Replace the configured target allow-list (repeatable).
        #[arg(long = "allow")]
        allow: Vec<String>,
    },
    /// Supervise the deployment: resume open runs, start on stale heartbeat.
    Watchdog {
        /// Seconds between ticks; defaults to the configured interval.
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Dispatch mutations instead of dry-running them.
        #[arg(long)]
        write_mode: bool,
        /// Replace the configured target allow-list (repeatable).
        #[arg(long = "allow")]
        allow: Vec<String>,
    },
    /// Print the discovered repository map as JSON (read-only).
    Scan,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    match cli.command {
        Command::RunOnce { write_mode, allow } => {
            apply_overrides(&mut settings, write_mode, allow)?;
            let outcome = run::run_once(&settings)?;
            Ok(exit_code_for(&outcome))
        }
        Command::RunLoop {
            interval_secs,
            max_cycles,
            write_mode,
            allow,
        } => {
            apply_overrides(&mut settings, write_mode, allow)?;
            run::run_loop(&settings, Duration::from_secs(interval_secs), max_cycles)?;
            Ok(exit_codes::OK)
        }
        Command::Watchdog {
            interval_secs,
            write_mode,
            allow,
        } => {
            apply_overrides(&mut settings, write_mode, allow)?;
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(settings.watchdog.interval_secs));
            run::run_watchdog(&settings, interval)?;
            Ok(exit_codes::OK)
        }
        Command::Scan => {
            run::scan_once(&settings)?;
            Ok(exit_codes::OK)
        }
    }
}

fn apply_overrides(settings: &mut Settings, write_mode: bool, allow: Vec<String>) -> Result<()> {
    if write_mode {
        settings.write_mode = true;
    }
    if !allow.is_empty() {
        settings.allow_targets = allow;
    }
    settings.validate()
}

fn exit_code_for(outcome: &RunOutcome) -> i32 {
    if outcome.cancelled {
        exit_codes::CANCELLED
    } else if outcome.state.phase == RunPhase::TerminalSuccess {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}
