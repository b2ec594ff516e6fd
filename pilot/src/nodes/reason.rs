//! Reason node: pick at most one task envelope for this run.
//!
//! An external reasoner gets the first say; anything it cannot or will not
//! answer falls back to a deterministic envelope built from the first
//! pending work item, so a missing or broken reasoner never stalls the run.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, info, instrument};

use crate::core::state::{RunState, StatePatch, TaskEnvelope, WorkItem};
use crate::io::reasoner::{ReasonContext, Reasoner};

#[instrument(skip_all, fields(items = state.work_items.len()))]
pub fn run(reasoner: &dyn Reasoner, ctx: &ReasonContext, state: &RunState) -> StatePatch {
    if state.work_items.is_empty() {
        debug!("no pending work, run will idle through");
        return StatePatch {
            task_envelope: Some(None),
            ..StatePatch::default()
        };
    }

    let envelope = match reasoner.select(&state.work_items, ctx) {
        Some(envelope) => envelope,
        None => {
            let item = &state.work_items[0];
            info!(task_id = %item.task_id, repo = %item.repo_name, "using fallback envelope");
            fallback_envelope(item, &ctx.default_target)
        }
    };
    StatePatch {
        task_envelope: Some(Some(envelope)),
        ..StatePatch::default()
    }
}

/// Deterministic envelope for one work item.
pub fn fallback_envelope(item: &WorkItem, default_target: &str) -> TaskEnvelope {
    let mut payload = BTreeMap::new();
    payload.insert("message".to_string(), json!(item.message));
    payload.insert(
        "copy_scope".to_string(),
        json!({ "mode": "last_n", "n": item.copy_last_n }),
    );
    let mut meta = BTreeMap::new();
    meta.insert("task_id".to_string(), json!(item.task_id));
    meta.insert("repo_name".to_string(), json!(item.repo_name));
    meta.insert("source".to_string(), json!("fallback"));

    TaskEnvelope {
        kind: "desktop_task".to_string(),
        intent: item.action.clone(),
        target: item
            .target
            .clone()
            .unwrap_or_else(|| default_target.to_string()),
        payload,
        details: BTreeMap::new(),
        meta,
    }
}
