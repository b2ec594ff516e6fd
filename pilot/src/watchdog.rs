//! Watchdog: periodic supervision of a deployment.
//!
//! Each tick takes the single-flight lock, finishes any run whose latest
//! checkpoint is not terminal, and otherwise compares the heartbeat age
//! against the staleness threshold to decide whether a fresh run is due.
//! A tick that cannot take the lock does nothing; some other pilot process
//! is already responsible.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::engine::{GraphEngine, generate_run_id};
use crate::io::checkpoint::CheckpointStore;
use crate::io::heartbeat::load_heartbeat;
use crate::io::lock::LockGuard;
use crate::io::trace::{TraceEvent, TraceSink};

/// What one tick decided to do.
#[derive(Debug, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Another instance holds the lock.
    LockedOut,
    /// Interrupted runs were driven to a terminal phase.
    Resumed(Vec<String>),
    /// Heartbeat absent or stale; a fresh run was started.
    Started(String),
    /// Heartbeat is recent enough, nothing to do.
    Healthy,
}

pub struct Watchdog<'a> {
    engine: &'a GraphEngine<'a>,
    store: &'a dyn CheckpointStore,
    trace: &'a dyn TraceSink,
    lock_path: PathBuf,
    heartbeat_path: PathBuf,
    heartbeat_stale: Duration,
}

impl<'a> Watchdog<'a> {
    pub fn new(
        engine: &'a GraphEngine<'a>,
        store: &'a dyn CheckpointStore,
        trace: &'a dyn TraceSink,
        lock_path: PathBuf,
        heartbeat_path: PathBuf,
        heartbeat_stale: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            trace,
            lock_path,
            heartbeat_path,
            heartbeat_stale,
        }
    }

    /// One supervision pass. The lock is held for the whole tick, covering
    /// any run the tick drives.
    #[instrument(skip_all)]
    pub fn tick(&self, now: i64) -> Result<WatchdogOutcome> {
        let Some(_guard) = LockGuard::acquire(&self.lock_path, now)? else {
            info!(lock = %self.lock_path.display(), "lock held elsewhere, standing down");
            return Ok(WatchdogOutcome::LockedOut);
        };

        let open = self.store.open_runs()?;
        if !open.is_empty() {
            let mut resumed = Vec::new();
            for run_id in open {
                match self.engine.resume(&run_id) {
                    Ok(state) => {
                        info!(run_id, phase = ?state.phase, "resumed interrupted run");
                        self.trace.record(
                            &TraceEvent::new(now, &run_id, "watchdog.resume")
                                .field("phase", json!(state.phase)),
                        );
                        resumed.push(run_id);
                    }
                    Err(err) => {
                        warn!(run_id, err = %format!("{err:#}"), "resume failed");
                    }
                }
            }
            return Ok(WatchdogOutcome::Resumed(resumed));
        }

        if let Some(heartbeat) = load_heartbeat(&self.heartbeat_path)
            && now - heartbeat.at < self.heartbeat_stale.as_secs() as i64
        {
            debug!(age_secs = now - heartbeat.at, "heartbeat fresh");
            self.trace.record(
                &TraceEvent::new(now, &heartbeat.run_id, "watchdog.ok")
                    .field("age_secs", json!(now - heartbeat.at)),
            );
            return Ok(WatchdogOutcome::Healthy);
        }

        let run_id = generate_run_id(self.store)?;
        info!(run_id, "heartbeat absent or stale, starting run");
        self.trace.record(&TraceEvent::new(now, &run_id, "watchdog.start"));
        let state = self.engine.run(&run_id)?;
        info!(run_id, phase = ?state.phase, "watchdog run finished");
        Ok(WatchdogOutcome::Started(run_id))
    }
}
