//! Engine that drives the fixed node graph over a single run.
//!
//! The engine owns the loop: route, execute, merge the patch, checkpoint,
//! trace, repeat until Persist. Nodes stay pure of control flow; every edge
//! decision lives in `core::topology`, every durability decision here. Act
//! is the one node bracketed by a checkpoint on entry as well, so a crash
//! mid-dispatch resumes into Act exactly once instead of guessing whether
//! the mutation landed.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::adapter::DesktopSurface;
use crate::core::allowlist::AllowList;
use crate::core::budget::RunDeadline;
use crate::core::state::{ActionReport, RunPhase, RunState, StatePatch};
use crate::core::topology::{self, Next, NodeName};
use crate::gate::GuardrailViolation;
use crate::io::checkpoint::{Checkpoint, CheckpointCorruption, CheckpointStore};
use crate::io::plan::Plan;
use crate::io::reasoner::{ReasonContext, Reasoner};
use crate::io::scan::VcsScanner;
use crate::io::trace::{TraceEvent, TraceSink};
use crate::nodes;

/// Cooperative cancellation handle, checked at node boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Underlying flag, for wiring OS signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Per-deployment settings the engine threads into nodes.
pub struct EngineConfig {
    pub repos_root: PathBuf,
    pub plan: Plan,
    /// Target pattern used when a work item carries no override.
    pub default_target: String,
    pub allowlist: AllowList,
    pub write_mode: bool,
    /// Recover → Act cycles permitted before the run is marked terminal.
    pub max_retries: u32,
    /// Wall-clock budget for one run, measured from `run`/`resume`.
    pub deadline: Duration,
    pub heartbeat_path: PathBuf,
}

/// Drives one run through the graph against injected collaborators.
pub struct GraphEngine<'a> {
    scanner: &'a dyn VcsScanner,
    reasoner: &'a dyn Reasoner,
    surface: &'a dyn DesktopSurface,
    store: &'a dyn CheckpointStore,
    trace: &'a dyn TraceSink,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl<'a> GraphEngine<'a> {
    pub fn new(
        scanner: &'a dyn VcsScanner,
        reasoner: &'a dyn Reasoner,
        surface: &'a dyn DesktopSurface,
        store: &'a dyn CheckpointStore,
        trace: &'a dyn TraceSink,
        config: EngineConfig,
    ) -> Self {
        Self {
            scanner,
            reasoner,
            surface,
            store,
            trace,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for requesting cancellation from another thread.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute a fresh run from the entry node to Persist.
    #[instrument(skip_all, fields(run_id))]
    pub fn run(&self, run_id: &str) -> Result<RunState> {
        let state = RunState::new(run_id, self.config.write_mode);
        info!(write_mode = self.config.write_mode, "starting run");
        self.trace.record(
            &TraceEvent::new(now_epoch(), run_id, "run.start")
                .field("write_mode", json!(self.config.write_mode)),
        );
        self.drive(state, topology::entry_node(), 1)
    }

    /// Re-enter an interrupted run from its latest checkpoint.
    ///
    /// The checkpoint decides the first node: an entry checkpoint at Act
    /// re-dispatches exactly once, a completion checkpoint routes onward
    /// from the recorded outcome. Undecodable checkpoints abort rather
    /// than guess.
    #[instrument(skip_all, fields(run_id))]
    pub fn resume(&self, run_id: &str) -> Result<RunState> {
        let latest = self
            .store
            .latest(run_id)?
            .ok_or_else(|| anyhow!("no checkpoints recorded for run '{run_id}'"))?;
        match topology::resume_from(latest.node, &latest.state) {
            Next::Node(node) => {
                info!(from = %latest.node, next = %node, "resuming run");
                self.trace.record(
                    &TraceEvent::new(now_epoch(), run_id, "run.resume")
                        .field("from_node", json!(latest.node))
                        .field("next_node", json!(node)),
                );
                self.drive(latest.state, node, latest.sequence_no + 1)
            }
            Next::Done => {
                info!("run already finished, nothing to resume");
                Ok(latest.state)
            }
        }
    }

    fn drive(&self, mut state: RunState, first: NodeName, first_seq: u64) -> Result<RunState> {
        let deadline = RunDeadline::from_now(self.config.deadline);
        let mut node = first;
        let mut sequence_no = first_seq;

        loop {
            // Persist is exempt from boundary checks: a cut-short run must
            // still land its terminal record and heartbeat.
            if node != NodeName::Persist
                && let Some(reason) = self.boundary_stop(deadline)
            {
                warn!(node = %node, reason, "run stopped at node boundary");
                if state.action_report.is_none() {
                    state.action_report = Some(ActionReport {
                        error: Some(reason),
                        ..ActionReport::default()
                    });
                }
                state.phase = RunPhase::TerminalFailure;
                node = NodeName::Persist;
            }

            let result = self.execute(node, &state, &mut sequence_no);

            let mut forced = None;
            let patch = match result {
                Ok(patch) => patch,
                Err(err) if node == NodeName::Persist => return Err(err),
                Err(err) => {
                    let unrecoverable =
                        err.is::<GuardrailViolation>() || err.is::<CheckpointCorruption>();
                    warn!(node = %node, err = %format!("{err:#}"), unrecoverable, "node failed");
                    if err.is::<GuardrailViolation>() {
                        self.trace.record(
                            &TraceEvent::new(now_epoch(), &state.run_id, "guardrail.violation")
                                .field("error", json!(format!("{err:#}"))),
                        );
                    }
                    let mut patch = StatePatch {
                        action_report: Some(Some(ActionReport {
                            error: Some(format!("{err:#}")),
                            ..ActionReport::default()
                        })),
                        ..StatePatch::default()
                    };
                    if unrecoverable {
                        patch.phase = Some(RunPhase::TerminalFailure);
                        forced = Some(NodeName::Persist);
                    } else {
                        forced = Some(NodeName::Recover);
                    }
                    patch
                }
            };

            state.apply(patch);
            self.append_checkpoint(&state, node, sequence_no)?;
            self.trace.record(
                &TraceEvent::new(now_epoch(), &state.run_id, "node.finish")
                    .field("node", json!(node))
                    .field("sequence_no", json!(sequence_no))
                    .field("phase", json!(state.phase)),
            );
            self.record_node_events(node, &state);
            sequence_no += 1;

            let next = match forced {
                Some(next) => Next::Node(next),
                None => topology::next_node(node, &state),
            };
            match next {
                Next::Node(next) => node = next,
                Next::Done => {
                    info!(phase = ?state.phase, "run finished");
                    self.trace.record(
                        &TraceEvent::new(now_epoch(), &state.run_id, "run.finish")
                            .field("phase", json!(state.phase)),
                    );
                    return Ok(state);
                }
            }
        }
    }

    /// Run one node, bracketing Act with its entry checkpoint.
    fn execute(&self, node: NodeName, state: &RunState, sequence_no: &mut u64) -> Result<StatePatch> {
        match node {
            NodeName::Scan => Ok(nodes::scan::run(self.scanner, &self.config.repos_root)),
            NodeName::Plan => Ok(nodes::plan::run(&self.config.plan, state)),
            NodeName::Reason => {
                let ctx = ReasonContext {
                    run_id: state.run_id.clone(),
                    repos: state.repos.clone(),
                    default_target: self.config.default_target.clone(),
                };
                Ok(nodes::reason::run(self.reasoner, &ctx, state))
            }
            NodeName::Act => {
                let entry = self.append_checkpoint(state, NodeName::Act, *sequence_no);
                *sequence_no += 1;
                entry
                    .and_then(|()| {
                        nodes::act::run(
                            self.surface,
                            &self.config.allowlist,
                            self.config.write_mode,
                            state,
                        )
                    })
                    .map(|report| StatePatch {
                        action_report: Some(Some(report)),
                        ..StatePatch::default()
                    })
            }
            NodeName::Validate => nodes::validate::run(state).map_err(Into::into),
            NodeName::Recover => Ok(nodes::recover::run(
                self.surface,
                state,
                self.config.max_retries,
            )),
            NodeName::Persist => {
                nodes::persist::run(&self.config.heartbeat_path, now_epoch(), state)
            }
        }
    }

    /// Domain events past the generic node record: one per act attempt, one
    /// per recovery decision.
    fn record_node_events(&self, node: NodeName, state: &RunState) {
        match node {
            NodeName::Act => {
                if let Some(report) = &state.action_report {
                    self.trace.record(
                        &TraceEvent::new(now_epoch(), &state.run_id, "action.report")
                            .field("status", json!(report.status))
                            .field("dry_run", json!(report.dry_run)),
                    );
                }
            }
            NodeName::Recover => {
                let name = if state.phase == RunPhase::TerminalFailure {
                    "recovery.exhausted"
                } else {
                    "recovery.attempt"
                };
                self.trace.record(
                    &TraceEvent::new(now_epoch(), &state.run_id, name)
                        .field("recovery_count", json!(state.recovery_count)),
                );
            }
            _ => {}
        }
    }

    fn boundary_stop(&self, deadline: RunDeadline) -> Option<String> {
        if self.cancel.is_cancelled() {
            return Some("cancelled".to_string());
        }
        if let Err(err) = deadline.remaining() {
            return Some(err.to_string());
        }
        None
    }

    fn append_checkpoint(&self, state: &RunState, node: NodeName, sequence_no: u64) -> Result<()> {
        self.store.append(&Checkpoint {
            run_id: state.run_id.clone(),
            node,
            sequence_no,
            at: now_epoch(),
            state: state.clone(),
        })
    }
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Allocate a run id no checkpoint file has used yet.
///
/// Ids are second-resolution timestamps; collisions within one second get a
/// numeric suffix, so two back-to-back runs never share a checkpoint file.
pub fn generate_run_id(store: &dyn CheckpointStore) -> Result<String> {
    let base = format!("run-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let mut candidate = base.clone();
    let mut n = 1;
    while store.latest(&candidate)?.is_some() {
        n += 1;
        candidate = format!("{base}-{n}");
    }
    Ok(candidate)
}
