//! Propose-verify-execute choke point for every desktop mutation.
//!
//! Nothing in the orchestrator calls `send_keys` or `set_clipboard` directly.
//! Mutations are bundled into a [`MutationProposal`], and the gate verifies
//! the target against the allow-list, brackets the batch with snapshots, and
//! withholds dispatch entirely outside write mode. A denied target fails
//! before the first snapshot is taken.

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapter::{AdapterError, DesktopSurface, Target};
use crate::core::allowlist::AllowList;
use crate::core::state::EvidenceRef;

pub const SNAPSHOT_PRE: &str = "snapshot.pre";
pub const SNAPSHOT_POST: &str = "snapshot.post";

/// Raised when a proposal names a target outside the allow-list. Terminal:
/// the run must not retry past a policy refusal.
#[derive(Debug, Error)]
#[error("guardrail violation: target '{target}' matches no allow-list pattern")]
pub struct GuardrailViolation {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationStep {
    SendKeys(String),
    SetClipboard(String),
}

impl MutationStep {
    fn name(&self) -> &'static str {
        match self {
            Self::SendKeys(_) => "send_keys",
            Self::SetClipboard(_) => "set_clipboard",
        }
    }
}

/// A verified-before-dispatch batch of mutations against one target.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationProposal {
    pub intent: String,
    pub target: Target,
    pub steps: Vec<MutationStep>,
}

/// What the gate actually did with a proposal.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub dry_run: bool,
    pub dispatched: usize,
    pub pre: EvidenceRef,
    pub post: EvidenceRef,
    pub error: Option<AdapterError>,
}

pub struct GuardrailGate<'a> {
    surface: &'a dyn DesktopSurface,
    allowlist: &'a AllowList,
    write_mode: bool,
}

impl<'a> GuardrailGate<'a> {
    pub fn new(surface: &'a dyn DesktopSurface, allowlist: &'a AllowList, write_mode: bool) -> Self {
        Self {
            surface,
            allowlist,
            write_mode,
        }
    }

    /// Verify and run one proposal.
    ///
    /// Dispatch stops at the first failing step; the post snapshot is still
    /// captured so the partial state is on record.
    #[instrument(skip_all, fields(
        intent = proposal.intent,
        target = proposal.target.title,
        steps = proposal.steps.len(),
        write_mode = self.write_mode,
    ))]
    pub fn execute(&self, proposal: &MutationProposal) -> Result<GateOutcome> {
        if !self.allowlist.permits(&proposal.target.title) {
            return Err(GuardrailViolation {
                target: proposal.target.title.clone(),
            }
            .into());
        }

        let pre = self
            .surface
            .capture_snapshot(&proposal.target)
            .context("capture pre-action snapshot")?;
        let pre = EvidenceRef {
            kind: SNAPSHOT_PRE.to_string(),
            uri: pre,
        };

        let mut dispatched = 0;
        let mut error = None;
        if self.write_mode {
            for step in &proposal.steps {
                let result = match step {
                    MutationStep::SendKeys(keys) => {
                        self.surface.send_keys(&proposal.target, keys)
                    }
                    MutationStep::SetClipboard(text) => self.surface.set_clipboard(text),
                };
                match result {
                    Ok(()) => dispatched += 1,
                    Err(err) => {
                        warn!(step = step.name(), dispatched, err = %err, "mutation step failed");
                        error = Some(err);
                        break;
                    }
                }
            }
        } else {
            info!(steps = proposal.steps.len(), "dry run, mutations withheld");
        }

        let post = self
            .surface
            .capture_snapshot(&proposal.target)
            .context("capture post-action snapshot")?;
        let post = EvidenceRef {
            kind: SNAPSHOT_POST.to_string(),
            uri: post,
        };

        Ok(GateOutcome {
            dry_run: !self.write_mode,
            dispatched,
            pre,
            post,
            error,
        })
    }
}
