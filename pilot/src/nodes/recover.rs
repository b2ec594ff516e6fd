//! Recover node: spend one retry, or end the run when none are left.
//!
//! Recovery never mutates the desktop. It re-verifies the surface with
//! read-only calls so the retried act starts from observed reality, then
//! clears the failed report and sends the run back to the action node. The
//! re-verification itself is best-effort; its failures are logged and the
//! attempt is consumed either way.

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::adapter::DesktopSurface;
use crate::core::state::{RunPhase, RunState, StatePatch};

#[instrument(skip_all, fields(recovery_count = state.recovery_count, max_retries))]
pub fn run(surface: &dyn DesktopSurface, state: &RunState, max_retries: u32) -> StatePatch {
    if state.recovery_count >= max_retries {
        let error = state
            .action_report
            .as_ref()
            .and_then(|report| report.error.as_deref())
            .unwrap_or("unknown failure");
        warn!(error, "recovery budget exhausted");
        return StatePatch {
            phase: Some(RunPhase::TerminalFailure),
            ..StatePatch::default()
        };
    }

    reverify(surface, state);
    info!(next_attempt = state.recovery_count + 1, "retrying the act");
    StatePatch {
        recovery_count: Some(state.recovery_count + 1),
        phase: Some(RunPhase::Recovering),
        action_report: Some(None),
        ..StatePatch::default()
    }
}

fn reverify(surface: &dyn DesktopSurface, state: &RunState) {
    let targets = match surface.enumerate_targets() {
        Ok(targets) => targets,
        Err(err) => {
            warn!(err = %err, "re-verification could not enumerate targets");
            return;
        }
    };
    debug!(targets = targets.len(), "surface is reachable");

    let Some(envelope) = state.task_envelope.as_ref() else {
        return;
    };
    let Ok(pattern) = Regex::new(&envelope.target) else {
        warn!(pattern = %envelope.target, "re-verification skipped, bad target pattern");
        return;
    };
    let Some(target) = targets.iter().find(|t| pattern.is_match(&t.title)) else {
        warn!(pattern = %envelope.target, "target is gone, retry will re-resolve");
        return;
    };
    match surface.capture_snapshot(target) {
        Ok(uri) => debug!(uri = %uri, "re-verification snapshot captured"),
        Err(err) => warn!(err = %err, "re-verification snapshot failed"),
    }
}
