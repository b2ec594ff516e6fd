//! Fixed node topology and routing rules.
//!
//! The graph is static: `Scan → Plan → Reason → Act → {Validate | Recover} →
//! Persist → done`, with `Recover → Act` as the only cycle. Recover marks the
//! run `terminal_failure` once the retry budget is exhausted, which reroutes
//! the cycle edge to Persist; the bound is therefore visible here and in
//! `nodes::recover`, not hidden in recursion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::state::{ActionStatus, RunPhase, RunState};

/// Names of the nodes in the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeName {
    Scan,
    Plan,
    Reason,
    Act,
    Validate,
    Recover,
    Persist,
}

impl NodeName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Plan => "plan",
            Self::Reason => "reason",
            Self::Act => "act",
            Self::Validate => "validate",
            Self::Recover => "recover",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the engine goes after a node completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Node(NodeName),
    Done,
}

/// First node of every run.
pub fn entry_node() -> NodeName {
    NodeName::Scan
}

/// Routing after `completed` finished without raising.
///
/// Conditional edges read only the merged state: Reason with no envelope
/// skips straight to Persist (an idle cycle), Act branches on the report
/// status, and Recover loops back to Act unless it marked the run terminal.
pub fn next_node(completed: NodeName, state: &RunState) -> Next {
    match completed {
        NodeName::Scan => Next::Node(NodeName::Plan),
        NodeName::Plan => Next::Node(NodeName::Reason),
        NodeName::Reason => {
            if state.task_envelope.is_some() {
                Next::Node(NodeName::Act)
            } else {
                Next::Node(NodeName::Persist)
            }
        }
        NodeName::Act => match &state.action_report {
            Some(report) if report.status == ActionStatus::Success => {
                Next::Node(NodeName::Validate)
            }
            _ => Next::Node(NodeName::Recover),
        },
        NodeName::Validate => Next::Node(NodeName::Persist),
        NodeName::Recover => {
            if state.phase == RunPhase::TerminalFailure {
                Next::Node(NodeName::Persist)
            } else {
                Next::Node(NodeName::Act)
            }
        }
        NodeName::Persist => Next::Done,
    }
}

/// Routing when re-entering the graph from the latest checkpoint.
///
/// A checkpoint exactly at Act with no recorded report is the entry
/// checkpoint: the mutation never committed, so Act runs again. A checkpoint
/// at Act with a report means the outcome is known and must not be
/// re-dispatched; normal routing consumes the recorded report instead.
pub fn resume_from(checkpointed: NodeName, state: &RunState) -> Next {
    if checkpointed == NodeName::Act && state.action_report.is_none() {
        return Next::Node(NodeName::Act);
    }
    next_node(checkpointed, state)
}
