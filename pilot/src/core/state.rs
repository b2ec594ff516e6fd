//! Canonical run state threaded through the node graph.
//!
//! `RunState` is mutable by replacement only: nodes return a [`StatePatch`]
//! and the engine merges it. Fields that are immutable for the lifetime of a
//! run (`run_id`, `write_mode`) have no patch slot, so a node cannot flip
//! them even by accident.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Recovering,
    TerminalSuccess,
    TerminalFailure,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TerminalSuccess | Self::TerminalFailure)
    }
}

/// Metadata discovered for one repository under the scan root.
///
/// A repository that could not be inspected keeps its entry with
/// `scan_error` set; the scan itself never fails the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub path: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub scan_error: Option<String>,
}

/// One candidate task, produced by expanding the plan over scanned repos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub task_id: String,
    pub repo_name: String,
    pub action: String,
    pub message: String,
    /// Target pattern override; falls back to the deployment default.
    #[serde(default)]
    pub target: Option<String>,
    /// How many trailing context lines the harvest step should request.
    pub copy_last_n: u32,
}

/// Selected task with open payload/details/meta maps.
///
/// The three maps are schema-loose on purpose: unknown keys pass through
/// deserialization, patching, and checkpointing unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub intent: String,
    pub target: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

/// Outcome classification of one Act attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    #[default]
    Failed,
    Partial,
}

/// Reference to captured evidence (a snapshot path or URI), never raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub kind: String,
    pub uri: String,
}

/// Outcome of the last Act attempt. The default is an empty failure;
/// success is always stated explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub status: ActionStatus,
    #[serde(default)]
    pub artifacts: Vec<EvidenceRef>,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when the gate withheld dispatch because `write_mode` was off.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// The single canonical record threaded through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    #[serde(default)]
    pub repos: BTreeMap<String, RepoInfo>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
    #[serde(default)]
    pub task_envelope: Option<TaskEnvelope>,
    #[serde(default)]
    pub action_report: Option<ActionReport>,
    /// Incremented only by Recover; never exceeds the configured retry bound.
    #[serde(default)]
    pub recovery_count: u32,
    pub write_mode: bool,
    /// Epoch seconds, updated by Persist, read by the watchdog.
    #[serde(default)]
    pub heartbeat_at: i64,
    pub phase: RunPhase,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, write_mode: bool) -> Self {
        Self {
            run_id: run_id.into(),
            repos: BTreeMap::new(),
            work_items: Vec::new(),
            task_envelope: None,
            action_report: None,
            recovery_count: 0,
            write_mode,
            heartbeat_at: 0,
            phase: RunPhase::Idle,
        }
    }

    /// Merge a node patch, overwriting only the fields the patch carries.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(repos) = patch.repos {
            self.repos = repos;
        }
        if let Some(work_items) = patch.work_items {
            self.work_items = work_items;
        }
        if let Some(task_envelope) = patch.task_envelope {
            self.task_envelope = task_envelope;
        }
        if let Some(action_report) = patch.action_report {
            self.action_report = action_report;
        }
        if let Some(recovery_count) = patch.recovery_count {
            self.recovery_count = recovery_count;
        }
        if let Some(heartbeat_at) = patch.heartbeat_at {
            self.heartbeat_at = heartbeat_at;
        }
        if let Some(phase) = patch.phase {
            self.phase = phase;
        }
    }
}

/// Field-overwrite patch returned by a node.
///
/// Double options (`task_envelope`, `action_report`) distinguish "leave
/// untouched" from "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub repos: Option<BTreeMap<String, RepoInfo>>,
    pub work_items: Option<Vec<WorkItem>>,
    pub task_envelope: Option<Option<TaskEnvelope>>,
    pub action_report: Option<Option<ActionReport>>,
    pub recovery_count: Option<u32>,
    pub heartbeat_at: Option<i64>,
    pub phase: Option<RunPhase>,
}
