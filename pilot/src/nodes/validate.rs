//! Validate node: check that the act left the evidence it claims.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::state::{ActionStatus, RunState, StatePatch};
use crate::gate::{SNAPSHOT_POST, SNAPSHOT_PRE};

#[derive(Debug, Error)]
#[error("validation failed: {reason}")]
pub struct ValidationError {
    pub reason: String,
}

fn fail(reason: impl Into<String>) -> ValidationError {
    ValidationError {
        reason: reason.into(),
    }
}

#[instrument(skip_all)]
pub fn run(state: &RunState) -> Result<StatePatch, ValidationError> {
    let report = state
        .action_report
        .as_ref()
        .ok_or_else(|| fail("no action report to validate"))?;

    if report.status != ActionStatus::Success {
        return Err(fail(format!("action status is {:?}", report.status)));
    }
    for kind in [SNAPSHOT_PRE, SNAPSHOT_POST] {
        if !report.artifacts.iter().any(|artifact| artifact.kind == kind) {
            return Err(fail(format!("evidence '{kind}' is missing")));
        }
    }
    debug!(artifacts = report.artifacts.len(), dry_run = report.dry_run, "validation passed");
    Ok(StatePatch::default())
}
