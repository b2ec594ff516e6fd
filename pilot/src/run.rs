//! Orchestration for CLI commands: wire settings into live collaborators
//! and hand the engine a run.
//!
//! Everything here is composition. Transport choice, lock discipline, signal
//! wiring, and loop cadence live in this module so the engine and nodes
//! never learn where their collaborators came from.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::adapter::DesktopSurface;
use crate::adapter::client::AdapterClient;
use crate::adapter::oneshot::OneshotTransport;
use crate::adapter::stdio::StdioTransport;
use crate::core::state::{RunPhase, RunState};
use crate::engine::{CancelFlag, EngineConfig, GraphEngine, generate_run_id, now_epoch};
use crate::io::checkpoint::JsonlCheckpointStore;
use crate::io::config::{Settings, TransportKind};
use crate::io::lock::LockGuard;
use crate::io::plan::load_plan;
use crate::io::reasoner::CommandReasoner;
use crate::io::scan::{GitScanner, VcsScanner};
use crate::io::trace::JsonlTraceSink;
use crate::watchdog::Watchdog;

/// Outcome of one CLI-driven run, for exit-code mapping.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// Set when an operator signal stopped the run at a node boundary.
    pub cancelled: bool,
}

/// Live collaborators built from settings, owned for the process lifetime.
struct Collaborators {
    scanner: GitScanner,
    reasoner: CommandReasoner,
    surface: Box<dyn DesktopSurface>,
    store: JsonlCheckpointStore,
    trace: JsonlTraceSink,
}

fn collaborators(settings: &Settings) -> Result<Collaborators> {
    Ok(Collaborators {
        scanner: GitScanner,
        reasoner: CommandReasoner::from_config(&settings.reasoner),
        surface: build_surface(settings)?,
        store: JsonlCheckpointStore::new(settings.checkpoints_dir()),
        trace: JsonlTraceSink::new(settings.episodes_dir()),
    })
}

fn build_surface(settings: &Settings) -> Result<Box<dyn DesktopSurface>> {
    let policy = settings.call_policy();
    match settings.adapter.transport {
        TransportKind::Stdio => {
            let transport = StdioTransport::connect(&settings.adapter.command, policy.call_timeout)
                .context("connect stdio adapter")?;
            Ok(Box::new(AdapterClient::new(transport, policy)))
        }
        TransportKind::Oneshot => {
            let transport = OneshotTransport::new(&settings.adapter.command)?;
            Ok(Box::new(AdapterClient::new(transport, policy)))
        }
    }
}

fn engine_config(settings: &Settings) -> Result<EngineConfig> {
    Ok(EngineConfig {
        repos_root: PathBuf::from(&settings.repos_root),
        plan: load_plan(Path::new(&settings.plan_path))?,
        default_target: settings.target_pattern.clone(),
        allowlist: settings.allowlist()?,
        write_mode: settings.write_mode,
        max_retries: settings.max_retries,
        deadline: settings.deadline(),
        heartbeat_path: settings.heartbeat_path(),
    })
}

/// Flip the engine's cancel flag on SIGINT/SIGTERM so a run stops at the
/// next node boundary instead of dying mid-dispatch.
fn register_shutdown_signals(cancel: &CancelFlag) {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, cancel.flag()) {
            warn!(signal, err = %err, "cannot register shutdown signal");
        }
    }
}

/// Interruptible sleep between cycles.
fn sleep_with_cancel(total: Duration, cancel: &CancelFlag) {
    let slice = Duration::from_millis(500);
    let mut remaining = total;
    while !cancel.is_cancelled() && !remaining.is_zero() {
        let nap = remaining.min(slice);
        thread::sleep(nap);
        remaining = remaining.saturating_sub(nap);
    }
}

/// Execute exactly one run under the single-flight lock.
pub fn run_once(settings: &Settings) -> Result<RunOutcome> {
    let parts = collaborators(settings)?;
    let engine = GraphEngine::new(
        &parts.scanner,
        &parts.reasoner,
        parts.surface.as_ref(),
        &parts.store,
        &parts.trace,
        engine_config(settings)?,
    );
    let cancel = engine.cancel_flag();
    register_shutdown_signals(&cancel);

    let lock_path = settings.lock_path();
    let Some(_lock) = LockGuard::acquire(&lock_path, now_epoch())? else {
        bail!(
            "another pilot instance holds the lock at {}",
            lock_path.display()
        );
    };

    let run_id = generate_run_id(&parts.store)?;
    let state = engine.run(&run_id)?;
    Ok(RunOutcome {
        cancelled: cancel.is_cancelled() && state.phase == RunPhase::TerminalFailure,
        state,
    })
}

/// Run cycles on a fixed interval until cancelled or `max_cycles` is hit.
///
/// The lock is taken per cycle, so a concurrently scheduled watchdog can
/// interleave; a cycle that loses the race is skipped, not queued.
pub fn run_loop(settings: &Settings, interval: Duration, max_cycles: Option<u32>) -> Result<()> {
    let parts = collaborators(settings)?;
    let engine = GraphEngine::new(
        &parts.scanner,
        &parts.reasoner,
        parts.surface.as_ref(),
        &parts.store,
        &parts.trace,
        engine_config(settings)?,
    );
    let cancel = engine.cancel_flag();
    register_shutdown_signals(&cancel);

    let lock_path = settings.lock_path();
    let mut cycle = 0u32;
    loop {
        if cancel.is_cancelled() {
            info!(cycle, "loop cancelled");
            return Ok(());
        }
        cycle += 1;
        match LockGuard::acquire(&lock_path, now_epoch())? {
            Some(_lock) => {
                let run_id = generate_run_id(&parts.store)?;
                match engine.run(&run_id) {
                    Ok(state) => info!(run_id, cycle, phase = ?state.phase, "cycle finished"),
                    Err(err) => {
                        warn!(run_id, cycle, err = %format!("{err:#}"), "cycle failed")
                    }
                }
            }
            None => info!(cycle, "lock held elsewhere, skipping cycle"),
        }
        if let Some(max) = max_cycles
            && cycle >= max
        {
            return Ok(());
        }
        sleep_with_cancel(interval, &cancel);
    }
}

/// Supervise the deployment: tick the watchdog on an interval until
/// cancelled. Tick failures are logged, not fatal.
pub fn run_watchdog(settings: &Settings, interval: Duration) -> Result<()> {
    let parts = collaborators(settings)?;
    let engine = GraphEngine::new(
        &parts.scanner,
        &parts.reasoner,
        parts.surface.as_ref(),
        &parts.store,
        &parts.trace,
        engine_config(settings)?,
    );
    let cancel = engine.cancel_flag();
    register_shutdown_signals(&cancel);

    let dog = Watchdog::new(
        &engine,
        &parts.store,
        &parts.trace,
        settings.lock_path(),
        settings.heartbeat_path(),
        Duration::from_secs(settings.watchdog.heartbeat_stale_secs),
    );
    loop {
        if cancel.is_cancelled() {
            info!("watchdog cancelled");
            return Ok(());
        }
        match dog.tick(now_epoch()) {
            Ok(outcome) => info!(outcome = ?outcome, "watchdog tick"),
            Err(err) => warn!(err = %format!("{err:#}"), "watchdog tick failed"),
        }
        sleep_with_cancel(interval, &cancel);
    }
}

/// Print the discovered repository map as JSON, read-only.
pub fn scan_once(settings: &Settings) -> Result<()> {
    let repos = GitScanner.scan(Path::new(&settings.repos_root));
    let mut payload = serde_json::to_string_pretty(&repos).context("serialize scan result")?;
    payload.push('\n');
    print!("{payload}");
    Ok(())
}
