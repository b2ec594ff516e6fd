//! Deployment configuration stored in `pilot.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::adapter::client::CallPolicy;
use crate::core::allowlist::AllowList;

/// Pilot configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to a safe dry-run deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directory scanned for git repositories.
    pub repos_root: String,

    /// Task plan consumed by the planner.
    pub plan_path: String,

    /// Directory holding checkpoints, heartbeat, lock and episode traces.
    pub state_dir: String,

    /// Mutations are only dispatched when true; otherwise every action is a
    /// dry run.
    pub write_mode: bool,

    /// Regex patterns over window titles that mutations may touch.
    pub allow_targets: Vec<String>,

    /// Window title pattern used when a task names no explicit target.
    pub target_pattern: String,

    /// Recovery attempts granted per run before terminal failure.
    pub max_retries: u32,

    /// Wall-clock budget for a single run in seconds.
    pub run_deadline_secs: u64,

    pub watchdog: WatchdogConfig,
    pub adapter: AdapterConfig,
    pub reasoner: ReasonerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Seconds between watchdog ticks in loop mode.
    pub interval_secs: u64,

    /// A heartbeat older than this many seconds marks the deployment stalled.
    pub heartbeat_stale_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            heartbeat_stale_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One long-lived adapter process, line-delimited JSON-RPC over stdio.
    Stdio,
    /// Fresh adapter process per call.
    Oneshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdapterConfig {
    pub transport: TransportKind,

    /// Command to spawn the desktop adapter (e.g. `["pilot-sim"]`).
    pub command: Vec<String>,

    /// Per-call timeout in seconds.
    pub call_timeout_secs: u64,

    /// Attempts per read operation; mutations always get exactly one.
    pub max_attempts: u32,

    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,

    /// Consecutive transport failures before the circuit opens.
    pub breaker_threshold: u32,

    /// Seconds an open circuit waits before probing with one trial call.
    pub breaker_cooldown_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            command: vec!["pilot-sim".to_string()],
            call_timeout_secs: 3,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 10_000,
            breaker_threshold: 5,
            breaker_cooldown_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Command that turns a prompt on stdin into a task envelope on stdout.
    /// Empty means no external reasoner; the deterministic fallback is used.
    pub command: Vec<String>,

    /// Wall-clock budget for one reasoner invocation in seconds.
    pub timeout_secs: u64,

    /// Truncate reasoner stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 60,
            output_limit_bytes: 65_536,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repos_root: ".".to_string(),
            plan_path: "plan.toml".to_string(),
            state_dir: ".pilot".to_string(),
            write_mode: false,
            allow_targets: vec![".*Visual Studio Code.*".to_string()],
            target_pattern: ".*Visual Studio Code.*".to_string(),
            max_retries: 2,
            run_deadline_secs: 600,
            watchdog: WatchdogConfig::default(),
            adapter: AdapterConfig::default(),
            reasoner: ReasonerConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.run_deadline_secs == 0 {
            return Err(anyhow!("run_deadline_secs must be > 0"));
        }
        AllowList::compile(&self.allow_targets).context("allow_targets")?;
        Regex::new(&self.target_pattern)
            .with_context(|| format!("compile target_pattern '{}'", self.target_pattern))?;
        if self.watchdog.interval_secs == 0 {
            return Err(anyhow!("watchdog.interval_secs must be > 0"));
        }
        if self.watchdog.heartbeat_stale_secs == 0 {
            return Err(anyhow!("watchdog.heartbeat_stale_secs must be > 0"));
        }
        if self.adapter.command.is_empty() || self.adapter.command[0].trim().is_empty() {
            return Err(anyhow!("adapter.command must be a non-empty array"));
        }
        if self.adapter.call_timeout_secs == 0 {
            return Err(anyhow!("adapter.call_timeout_secs must be > 0"));
        }
        if self.adapter.max_attempts == 0 {
            return Err(anyhow!("adapter.max_attempts must be >= 1"));
        }
        if self.adapter.backoff_base_ms == 0 {
            return Err(anyhow!("adapter.backoff_base_ms must be > 0"));
        }
        if self.adapter.backoff_cap_ms < self.adapter.backoff_base_ms {
            return Err(anyhow!("adapter.backoff_cap_ms must be >= backoff_base_ms"));
        }
        if self.adapter.breaker_threshold == 0 {
            return Err(anyhow!("adapter.breaker_threshold must be >= 1"));
        }
        if self.reasoner.timeout_secs == 0 {
            return Err(anyhow!("reasoner.timeout_secs must be > 0"));
        }
        if self.reasoner.output_limit_bytes == 0 {
            return Err(anyhow!("reasoner.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn allowlist(&self) -> Result<AllowList> {
        AllowList::compile(&self.allow_targets)
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            call_timeout: Duration::from_secs(self.adapter.call_timeout_secs),
            max_attempts: self.adapter.max_attempts,
            backoff_base: Duration::from_millis(self.adapter.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.adapter.backoff_cap_ms),
            breaker_threshold: self.adapter.breaker_threshold,
            breaker_cooldown: Duration::from_secs(self.adapter.breaker_cooldown_secs),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        Path::new(&self.state_dir).join("checkpoints")
    }

    pub fn episodes_dir(&self) -> PathBuf {
        Path::new(&self.state_dir).join("episodes")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("heartbeat.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        Path::new(&self.state_dir).join("watchdog.lock")
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}
