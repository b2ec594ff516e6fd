//! Persist node: settle the final phase and refresh the heartbeat.

use std::path::Path;

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::state::{RunPhase, RunState, StatePatch};
use crate::io::heartbeat::{Heartbeat, write_heartbeat};

#[instrument(skip_all, fields(phase = ?state.phase))]
pub fn run(heartbeat_path: &Path, now: i64, state: &RunState) -> Result<StatePatch> {
    write_heartbeat(
        heartbeat_path,
        &Heartbeat {
            run_id: state.run_id.clone(),
            at: now,
        },
    )?;

    let phase = if state.phase.is_terminal() {
        None
    } else {
        Some(RunPhase::TerminalSuccess)
    };
    info!(final_phase = ?phase.unwrap_or(state.phase), "run persisted");
    Ok(StatePatch {
        heartbeat_at: Some(now),
        phase,
        ..StatePatch::default()
    })
}
