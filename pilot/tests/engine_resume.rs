//! Resume semantics across a process boundary.
//!
//! Each test seeds a checkpoint log as a crashed process would have left it,
//! then resumes with fresh collaborators. The act idempotency rule is the
//! point: an entry checkpoint re-dispatches exactly once, a completion
//! checkpoint routes onward from the recorded outcome and never re-dispatches.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use pilot::core::allowlist::AllowList;
use pilot::core::state::{ActionReport, ActionStatus, EvidenceRef, RunPhase, RunState};
use pilot::core::topology::NodeName;
use pilot::engine::{self, EngineConfig, GraphEngine};
use pilot::gate::{SNAPSHOT_POST, SNAPSHOT_PRE};
use pilot::io::checkpoint::{Checkpoint, CheckpointStore, JsonlCheckpointStore};
use pilot::io::plan::Plan;
use pilot::test_support::{MemorySink, ScriptedReasoner, ScriptedSurface, StaticScanner, envelope};

const MESSAGE: &str = "resume hello";

fn config(dir: &Path) -> EngineConfig {
    EngineConfig {
        repos_root: dir.join("repos"),
        plan: Plan::default(),
        default_target: ".*Visual Studio Code.*".to_string(),
        allowlist: AllowList::compile(&[".*Visual Studio Code.*".to_string()]).expect("allowlist"),
        write_mode: true,
        max_retries: 2,
        deadline: Duration::from_secs(60),
        heartbeat_path: dir.join("heartbeat.json"),
    }
}

/// State as a run mid-act would carry it: envelope selected, nothing acted.
fn mid_act_state(run_id: &str) -> RunState {
    let mut state = RunState::new(run_id, true);
    state.phase = RunPhase::Running;
    state.task_envelope = Some(envelope(
        "post_status",
        ".*Visual Studio Code.*",
        MESSAGE,
    ));
    state
}

fn act_checkpoint(run_id: &str, sequence_no: u64, state: RunState) -> Checkpoint {
    Checkpoint {
        run_id: run_id.to_string(),
        node: NodeName::Act,
        sequence_no,
        at: engine::now_epoch(),
        state,
    }
}

fn evidence(kind: &str, uri: &str) -> EvidenceRef {
    EvidenceRef {
        kind: kind.to_string(),
        uri: uri.to_string(),
    }
}

/// Crash after the entry checkpoint but before the completion one: the
/// dispatch outcome is unknown, so resume re-enters Act exactly once.
#[test]
fn entry_checkpoint_redispatches_exactly_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    // Entry line: at Act, no report yet.
    store
        .append(&act_checkpoint("run-crashed", 4, mid_act_state("run-crashed")))
        .expect("seed entry checkpoint");

    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path()),
    );

    let state = engine.resume("run-crashed").expect("resume");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    // Exactly one act's worth of surface calls.
    assert_eq!(surface.journal().len(), 12);
    assert_eq!(surface.mutation_count(), 5);
    assert_eq!(surface.clipboard(), MESSAGE);

    // New entry + completion + validate + persist continue the sequence.
    let latest = store.latest("run-crashed").expect("latest").expect("some");
    assert_eq!(latest.node, NodeName::Persist);
    assert_eq!(latest.sequence_no, 8);
}

/// Crash after the completion checkpoint: the outcome is known, so resume
/// routes from it without touching the surface again.
#[test]
fn completion_checkpoint_never_redispatches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let mut state = mid_act_state("run-done-act");
    state.action_report = Some(ActionReport {
        status: ActionStatus::Success,
        artifacts: vec![
            evidence(SNAPSHOT_PRE, "mem://snap-1"),
            evidence(SNAPSHOT_POST, "mem://snap-2"),
            evidence(SNAPSHOT_PRE, "mem://snap-3"),
            evidence(SNAPSHOT_POST, "mem://snap-4"),
        ],
        ..ActionReport::default()
    });
    store
        .append(&act_checkpoint("run-done-act", 5, state))
        .expect("seed completion checkpoint");

    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path()),
    );

    let state = engine.resume("run-done-act").expect("resume");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    assert!(surface.journal().is_empty(), "no adapter call on this path");

    let latest = store.latest("run-done-act").expect("latest").expect("some");
    assert_eq!(latest.node, NodeName::Persist);
    assert_eq!(latest.sequence_no, 7, "validate and persist only");
}

/// A completion checkpoint with a failed report resumes into Recover: one
/// retry is consumed, the surface is re-verified, then Act runs again.
#[test]
fn failed_completion_resumes_through_recover() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let mut state = mid_act_state("run-failed-act");
    state.action_report = Some(ActionReport {
        status: ActionStatus::Failed,
        artifacts: vec![
            evidence(SNAPSHOT_PRE, "mem://snap-1"),
            evidence(SNAPSHOT_POST, "mem://snap-2"),
        ],
        error: Some("post_status: surface busy on set_clipboard: indexing".to_string()),
        ..ActionReport::default()
    });
    store
        .append(&act_checkpoint("run-failed-act", 5, state))
        .expect("seed failed completion");

    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path()),
    );

    let state = engine.resume("run-failed-act").expect("resume");

    assert_eq!(state.phase, RunPhase::TerminalSuccess);
    assert_eq!(state.recovery_count, 1);

    // Re-verification (2 read calls) then one full act (12 calls).
    let journal = surface.journal();
    assert_eq!(journal.len(), 14);
    assert_eq!(journal[0], "enumerate_targets");
    assert_eq!(journal[1], "capture_snapshot w1");
    assert_eq!(journal[2], "enumerate_targets");
}

/// An undecodable checkpoint tail aborts the resume instead of guessing at
/// state, and the watchdog's open-run listing skips the run entirely.
#[test]
fn corrupt_tail_aborts_resume() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let mut state = RunState::new("run-bad", false);
    state.phase = RunPhase::Running;
    store
        .append(&Checkpoint {
            run_id: "run-bad".to_string(),
            node: NodeName::Scan,
            sequence_no: 1,
            at: engine::now_epoch(),
            state,
        })
        .expect("seed checkpoint");

    let path = dir.path().join("checkpoints").join("run-bad.jsonl");
    let mut file = OpenOptions::new().append(true).open(&path).expect("open log");
    writeln!(file, "{{ not json").expect("append garbage");

    let scanner = StaticScanner::with_names(&["repo-a"]);
    let reasoner = ScriptedReasoner::new(vec![]);
    let surface = ScriptedSurface::new(&["notes - Visual Studio Code"]);
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path()),
    );

    let err = engine.resume("run-bad").expect_err("corrupt tail must abort");
    assert!(format!("{err:#}").contains("checkpoint corruption"));

    let open = store.open_runs().expect("open runs");
    assert!(open.is_empty(), "corrupt run is evidence, not work");
}

/// Resuming a run with no checkpoint file at all is an error, not a fresh run.
#[test]
fn unknown_run_cannot_be_resumed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints"));
    let scanner = StaticScanner::with_names(&[]);
    let reasoner = ScriptedReasoner::new(vec![]);
    let surface = ScriptedSurface::new(&[]);
    let trace = MemorySink::new();
    let engine = GraphEngine::new(
        &scanner,
        &reasoner,
        &surface,
        &store,
        &trace,
        config(dir.path()),
    );

    let err = engine.resume("run-never-ran").expect_err("must fail");
    assert!(format!("{err:#}").contains("no checkpoints recorded"));
}
