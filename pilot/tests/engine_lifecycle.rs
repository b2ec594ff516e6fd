//! Engine-level tests for full run lifecycles.
//!
//! These drive `GraphEngine` end to end over scripted collaborators and
//! assert the durable artifacts a run leaves behind: the call journal the
//! surface saw, the checkpoint log on disk, the heartbeat, and the episode
//! trace.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use pilot::adapter::{AdapterError, OpKind};
use pilot::core::allowlist::AllowList;
use pilot::core::state::{ActionStatus, RunPhase};
use pilot::engine::{EngineConfig, GraphEngine};
use pilot::gate::{SNAPSHOT_POST, SNAPSHOT_PRE};
use pilot::io::checkpoint::{Checkpoint, JsonlCheckpointStore};
use pilot::io::heartbeat::load_heartbeat;
use pilot::io::plan::{Plan, PlanTask};
use pilot::io::trace::{JsonlTraceSink, TraceEvent};
use pilot::test_support::{MemorySink, ScriptedReasoner, ScriptedSurface, StaticScanner};

/// One task posting a short status line, harvesting the last two lines of
/// context first.
fn delivery_plan() -> Plan {
    Plan {
        tasks: vec![PlanTask {
            id: "nudge".to_string(),
            repo_selector: ".*".to_string(),
            action: "post_status".to_string(),
            message: "status: tests are green".to_string(),
            target: None,
            copy_last_n: 2,
        }],
    }
}

fn config(dir: &Path, write_mode: bool) -> EngineConfig {
    EngineConfig {
        repos_root: dir.join("repos"),
        plan: delivery_plan(),
        default_target: ".*Visual Studio Code.*".to_string(),
        allowlist: AllowList::compile(&[".*Visual Studio Code.*".to_string()]).expect("allowlist"),
        write_mode,
        max_retries: 2,
        deadline: Duration::from_secs(60),
        heartbeat_path: dir.join("heartbeat.json"),
    }
}

fn read_checkpoints(dir: &Path, run_id: &str) -> Vec<Checkpoint> {
    let path = dir.join("checkpoints").join(format!("{run_id}.jsonl"));
    let raw = fs::read_to_string(&path).expect("read checkpoint log");
    raw.lines()
        .map(|line| serde_json::from_str(line).expect("decode checkpoint"))
        .collect()
}

/// Full write-mode run: fallback envelope, harvest of the last two clipboard
/// lines, then the post batch delivering `message\n\nharvest`.
///
/// Execution sequence:
/// 1. Scan finds `repo-a`, Plan derives one work item.
/// 2. Reason answers `None`, so the deterministic fallback envelope is used
///    (target falls back to the deployment default).
/// 3. Act resolves the window, harvests, posts; four snapshots bracket the
///    two batches.
/// 4. Validate accepts, Persist writes the heartbeat.
#[test]
fn write_run_delivers_message_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![None]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    surface.seed_clipboard("one\ntwo\nthree");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path(), true),
    );

    let state = engine.run("run-e2e").expect("run");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    let report = state.action_report.as_ref().expect("report");
    assert_eq!(report.status, ActionStatus::Success);
    assert!(!report.dry_run);
    assert!(report.error.is_none());

    // The post landed: message first, then the two harvested tail lines.
    assert_eq!(surface.clipboard(), "status: tests are green\n\ntwo\nthree");
    assert_eq!(
        surface.journal(),
        vec![
            "enumerate_targets",
            "focus w1",
            "capture_snapshot w1",
            "send_keys w1 ctrl+a",
            "send_keys w1 ctrl+c",
            "capture_snapshot w1",
            "get_clipboard",
            "capture_snapshot w1",
            "set_clipboard status: tests are green\n\ntwo\nthree",
            "send_keys w1 ctrl+v",
            "send_keys w1 enter",
            "capture_snapshot w1",
        ]
    );

    let kinds: Vec<&str> = report.artifacts.iter().map(|a| a.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![SNAPSHOT_PRE, SNAPSHOT_POST, SNAPSHOT_PRE, SNAPSHOT_POST]
    );

    let heartbeat = load_heartbeat(&dir.path().join("heartbeat.json")).expect("heartbeat");
    assert_eq!(heartbeat.run_id, "run-e2e");
    assert!(heartbeat.at > 0);

    reasoner.assert_drained();
}

/// The checkpoint log is the authoritative trail: one line per node plus the
/// extra entry line before the act dispatch, sequence numbers strictly
/// increasing from 1.
#[test]
fn checkpoint_log_records_every_node_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![None]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path(), true),
    );

    engine.run("run-log").expect("run");

    let checkpoints = read_checkpoints(dir.path(), "run-log");
    let nodes: Vec<&str> = checkpoints.iter().map(|c| c.node.as_str()).collect();
    assert_eq!(
        nodes,
        vec!["scan", "plan", "reason", "act", "act", "validate", "persist"]
    );
    let seqs: Vec<u64> = checkpoints.iter().map(|c| c.sequence_no).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6, 7]);

    // Entry line carries no report; the completion line does.
    assert!(checkpoints[3].state.action_report.is_none());
    assert!(checkpoints[4].state.action_report.is_some());
    assert!(checkpoints[6].state.phase.is_terminal());
}

/// Dry run walks the identical node path and takes the same four snapshots,
/// but no mutation and no clipboard read ever reach the surface.
#[test]
fn dry_run_is_evidence_complete_but_mutation_free() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![None]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    surface.seed_clipboard("one\ntwo\nthree");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path(), false),
    );

    let state = engine.run("run-dry").expect("run");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    let report = state.action_report.as_ref().expect("report");
    assert_eq!(report.status, ActionStatus::Success);
    assert!(report.dry_run);
    assert_eq!(surface.mutation_count(), 0);
    assert_eq!(surface.snapshot_count(), 4);
    assert_eq!(surface.clipboard(), "one\ntwo\nthree", "clipboard untouched");
    assert_eq!(report.details.get("dispatched").and_then(Value::as_u64), Some(0));
    assert_eq!(report.details.get("copied_chars").and_then(Value::as_u64), Some(0));
}

/// A failed post consumes one recovery: the surface is re-verified with
/// read-only calls, then the whole act is re-dispatched from resolve.
///
/// Execution sequence:
/// 1. Act #1: harvest succeeds, `set_clipboard` fails, report is Failed.
/// 2. Recover: `enumerate_targets` + one snapshot, retry granted.
/// 3. Act #2: full batch succeeds, Validate and Persist close the run.
#[test]
fn failed_post_is_reverified_then_retried() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![None]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    surface.seed_clipboard("one\ntwo\nthree");
    surface.push_failure(
        OpKind::SetClipboard,
        AdapterError::Transport {
            operation: OpKind::SetClipboard,
            message: "socket closed".to_string(),
        },
    );
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path(), true),
    );

    let state = engine.run("run-retry").expect("run");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    assert_eq!(state.recovery_count, 1);
    assert_eq!(surface.clipboard(), "status: tests are green\n\ntwo\nthree");

    // Attempt #1 stops after the failed set_clipboard (9 calls), recovery
    // re-verifies (2 calls), attempt #2 runs the full act (12 calls).
    let journal = surface.journal();
    assert_eq!(journal.len(), 23);
    assert_eq!(journal[9], "enumerate_targets");
    assert_eq!(journal[10], "capture_snapshot w1");
    assert_eq!(journal[11], "enumerate_targets");

    let checkpoints = read_checkpoints(dir.path(), "run-retry");
    let nodes: Vec<&str> = checkpoints.iter().map(|c| c.node.as_str()).collect();
    assert_eq!(
        nodes,
        vec![
            "scan", "plan", "reason", "act", "act", "recover", "act", "act", "validate",
            "persist"
        ]
    );
}

/// The JSONL trace sink partitions episodes by UTC day and brackets every
/// run with `run.start` and `run.finish`.
#[test]
fn episode_trace_lands_in_day_partition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![None]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let trace = JsonlTraceSink::new(dir.path().join("episodes"));
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path(), true),
    );

    engine.run("run-trace").expect("run");

    let mut day_dirs: Vec<_> = fs::read_dir(dir.path().join("episodes"))
        .expect("read episodes dir")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(day_dirs.len(), 1, "one UTC day partition");
    let events_path = day_dirs.remove(0).join("events.jsonl");
    let raw = fs::read_to_string(&events_path).expect("read events");
    let events: Vec<TraceEvent> = raw
        .lines()
        .map(|line| serde_json::from_str(line).expect("decode event"))
        .collect();

    assert_eq!(events.first().map(|e| e.name.as_str()), Some("run.start"));
    assert_eq!(events.last().map(|e| e.name.as_str()), Some("run.finish"));
    assert!(events.iter().all(|e| e.run_id == "run-trace"));
    let node_finishes = events.iter().filter(|e| e.name == "node.finish").count();
    assert_eq!(node_finishes, 6, "one per node execution");
}
