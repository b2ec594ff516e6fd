//! Act node: run the selected task against the desktop through the gate.
//!
//! One act is two gated batches: a harvest (select-all, copy) that reads
//! recent context out of the target window, then the post (set clipboard,
//! paste, enter) that delivers the message. Both batches are bracketed by
//! snapshots, so a successful act carries four evidence refs.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::adapter::{DesktopSurface, Target};
use crate::core::allowlist::AllowList;
use crate::core::state::{ActionReport, ActionStatus, RunState, TaskEnvelope};
use crate::gate::{GateOutcome, GuardrailGate, MutationProposal, MutationStep};

#[instrument(skip_all, fields(write_mode))]
pub fn run(
    surface: &dyn DesktopSurface,
    allowlist: &AllowList,
    write_mode: bool,
    state: &RunState,
) -> Result<ActionReport> {
    let envelope = state
        .task_envelope
        .as_ref()
        .ok_or_else(|| anyhow!("act requires a task envelope"))?;
    let message = envelope
        .payload
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("task envelope has no payload.message"))?
        .to_string();

    let target = resolve_target(surface, &envelope.target)?;
    surface
        .focus(&target)
        .with_context(|| format!("focus '{}'", target.title))?;

    let gate = GuardrailGate::new(surface, allowlist, write_mode);
    let mut report = ActionReport {
        status: ActionStatus::Success,
        ..ActionReport::default()
    };

    let mut harvested = String::new();
    let copy_last_n = harvest_lines(envelope);
    if copy_last_n > 0 {
        let proposal = MutationProposal {
            intent: "harvest".to_string(),
            target: target.clone(),
            steps: vec![
                MutationStep::SendKeys("ctrl+a".to_string()),
                MutationStep::SendKeys("ctrl+c".to_string()),
            ],
        };
        let outcome = gate.execute(&proposal)?;
        record_outcome(&mut report, &outcome);
        if let Some(err) = outcome.error {
            warn!(err = %err, "harvest batch failed");
            report.status = ActionStatus::Failed;
            report.error = Some(format!("harvest: {err}"));
            return Ok(report);
        }
        if outcome.dispatched == proposal.steps.len() {
            let copied = surface
                .get_clipboard()
                .context("read harvested clipboard")?;
            harvested = last_lines(&copied, copy_last_n);
            debug!(copied_chars = harvested.len(), "harvest complete");
        }
    }

    let text = if harvested.is_empty() {
        message
    } else {
        format!("{message}\n\n{harvested}")
    };
    let proposal = MutationProposal {
        intent: envelope.intent.clone(),
        target,
        steps: vec![
            MutationStep::SetClipboard(text),
            MutationStep::SendKeys("ctrl+v".to_string()),
            MutationStep::SendKeys("enter".to_string()),
        ],
    };
    let outcome = gate.execute(&proposal)?;
    record_outcome(&mut report, &outcome);

    report
        .details
        .insert("copied_chars".to_string(), json!(harvested.len()));
    if let Some(err) = outcome.error {
        report.status = if outcome.dispatched > 0 {
            ActionStatus::Partial
        } else {
            ActionStatus::Failed
        };
        report.error = Some(format!("{}: {err}", envelope.intent));
    }
    info!(status = ?report.status, dry_run = report.dry_run, "act finished");
    Ok(report)
}

fn resolve_target(surface: &dyn DesktopSurface, pattern: &str) -> Result<Target> {
    let pattern_re = Regex::new(pattern)
        .with_context(|| format!("compile target pattern '{pattern}'"))?;
    let targets = surface.enumerate_targets().context("enumerate targets")?;
    targets
        .into_iter()
        .find(|target| pattern_re.is_match(&target.title))
        .ok_or_else(|| anyhow!("no window title matches '{pattern}'"))
}

fn record_outcome(report: &mut ActionReport, outcome: &GateOutcome) {
    report.dry_run = outcome.dry_run;
    report.artifacts.push(outcome.pre.clone());
    report.artifacts.push(outcome.post.clone());
    let dispatched = report
        .details
        .get("dispatched")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    report.details.insert(
        "dispatched".to_string(),
        json!(dispatched + outcome.dispatched as u64),
    );
}

fn harvest_lines(envelope: &TaskEnvelope) -> u32 {
    let Some(scope) = envelope.payload.get("copy_scope") else {
        return 0;
    };
    if scope.get("mode").and_then(Value::as_str) != Some("last_n") {
        return 0;
    }
    scope.get("n").and_then(Value::as_u64).unwrap_or(0) as u32
}

fn last_lines(text: &str, n: u32) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n as usize);
    lines[skip..].join("\n")
}
