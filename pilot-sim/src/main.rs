//! Simulated desktop-automation surface speaking line-delimited JSON-RPC
//! over stdio.
//!
//! One request per line on stdin, one response per line on stdout. The
//! simulator serves the same operations the pilot dispatches, against an
//! in-memory window list, clipboard, and keystroke journal, so a deployment
//! can be exercised end to end without a real desktop. `--fail` injects
//! busy errors for retry and breaker testing.

mod sim;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::sim::{SimState, parse_failures};

#[derive(Parser)]
#[command(name = "pilot-sim", version, about = "Simulated desktop-automation surface")]
struct Cli {
    /// Window title to expose; repeatable. Defaults to one editor window.
    #[arg(long = "windows", value_name = "TITLE")]
    windows: Vec<String>,

    /// Answer the first N calls of an operation with a busy error;
    /// repeatable, e.g. `--fail enumerate_targets=2`.
    #[arg(long = "fail", value_name = "OP=N")]
    fail: Vec<String>,

    /// Write snapshot evidence files here instead of returning `sim://` URIs.
    #[arg(long = "snapshot-dir", value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut titles = cli.windows;
    if titles.is_empty() {
        titles.push("notes - Visual Studio Code".to_string());
    }
    let failures = parse_failures(&cli.fail)?;
    let mut state = SimState::new(&titles, failures, cli.snapshot_dir);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = state.handle_line(&line);
        let mut frame = serde_json::to_string(&response).context("encode response")?;
        frame.push('\n');
        out.write_all(frame.as_bytes()).context("write response")?;
        out.flush().context("flush response")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_windows_and_failures() {
        let cli = Cli::parse_from([
            "pilot-sim",
            "--windows",
            "alpha",
            "--windows",
            "beta",
            "--fail",
            "focus=2",
        ]);
        assert_eq!(cli.windows, ["alpha", "beta"]);
        assert_eq!(cli.fail, ["focus=2"]);
        assert!(cli.snapshot_dir.is_none());
    }

    #[test]
    fn parse_snapshot_dir() {
        let cli = Cli::parse_from(["pilot-sim", "--snapshot-dir", "/tmp/snaps"]);
        assert_eq!(cli.snapshot_dir, Some(PathBuf::from("/tmp/snaps")));
        assert!(cli.windows.is_empty());
    }
}
