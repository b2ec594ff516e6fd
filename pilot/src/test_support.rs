//! Test-only fakes and builders shared by unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use serde_json::json;

use crate::adapter::{AdapterError, DesktopSurface, OpKind, Target};
use crate::core::state::{RepoInfo, TaskEnvelope, WorkItem};
use crate::io::reasoner::{ReasonContext, Reasoner};
use crate::io::scan::VcsScanner;
use crate::io::trace::{TraceEvent, TraceSink};

/// In-memory desktop surface with scripted failures and a call journal.
///
/// Every operation appends one line to the journal; tests assert on the exact
/// sequence. Failures are queued per operation and consumed in order, so a
/// test can make the second snapshot fail while everything else succeeds.
pub struct ScriptedSurface {
    targets: Vec<Target>,
    clipboard: RefCell<String>,
    journal: RefCell<Vec<String>>,
    failures: RefCell<BTreeMap<OpKind, VecDeque<AdapterError>>>,
    snapshot_seq: RefCell<u32>,
}

impl ScriptedSurface {
    /// Surface exposing one window per title, with ids `w1`, `w2`, ...
    pub fn new(titles: &[&str]) -> Self {
        let targets = titles
            .iter()
            .enumerate()
            .map(|(idx, title)| Target {
                id: format!("w{}", idx + 1),
                title: (*title).to_string(),
            })
            .collect();
        Self {
            targets,
            clipboard: RefCell::new(String::new()),
            journal: RefCell::new(Vec::new()),
            failures: RefCell::new(BTreeMap::new()),
            snapshot_seq: RefCell::new(0),
        }
    }

    /// Queue `err` for the next call of `operation`.
    pub fn push_failure(&self, operation: OpKind, err: AdapterError) {
        self.failures
            .borrow_mut()
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    pub fn seed_clipboard(&self, text: &str) {
        *self.clipboard.borrow_mut() = text.to_string();
    }

    pub fn clipboard(&self) -> String {
        self.clipboard.borrow().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    /// Number of mutating calls (`send_keys` + `set_clipboard`) that reached
    /// the surface.
    pub fn mutation_count(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .filter(|line| line.starts_with("send_keys") || line.starts_with("set_clipboard"))
            .count()
    }

    pub fn snapshot_count(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .filter(|line| line.starts_with("capture_snapshot"))
            .count()
    }

    fn take_failure(&self, operation: OpKind) -> Option<AdapterError> {
        self.failures
            .borrow_mut()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
    }

    fn record(&self, line: String) {
        self.journal.borrow_mut().push(line);
    }
}

impl DesktopSurface for ScriptedSurface {
    fn enumerate_targets(&self) -> Result<Vec<Target>, AdapterError> {
        if let Some(err) = self.take_failure(OpKind::EnumerateTargets) {
            return Err(err);
        }
        self.record("enumerate_targets".to_string());
        Ok(self.targets.clone())
    }

    fn focus(&self, target: &Target) -> Result<(), AdapterError> {
        if let Some(err) = self.take_failure(OpKind::Focus) {
            return Err(err);
        }
        self.record(format!("focus {}", target.id));
        Ok(())
    }

    fn capture_snapshot(&self, target: &Target) -> Result<String, AdapterError> {
        if let Some(err) = self.take_failure(OpKind::CaptureSnapshot) {
            return Err(err);
        }
        let seq = {
            let mut seq = self.snapshot_seq.borrow_mut();
            *seq += 1;
            *seq
        };
        self.record(format!("capture_snapshot {}", target.id));
        Ok(format!("mem://snap-{seq}"))
    }

    fn send_keys(&self, target: &Target, keys: &str) -> Result<(), AdapterError> {
        if let Some(err) = self.take_failure(OpKind::SendKeys) {
            return Err(err);
        }
        self.record(format!("send_keys {} {keys}", target.id));
        Ok(())
    }

    fn get_clipboard(&self) -> Result<String, AdapterError> {
        if let Some(err) = self.take_failure(OpKind::GetClipboard) {
            return Err(err);
        }
        self.record("get_clipboard".to_string());
        Ok(self.clipboard.borrow().clone())
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AdapterError> {
        if let Some(err) = self.take_failure(OpKind::SetClipboard) {
            return Err(err);
        }
        self.record(format!("set_clipboard {text}"));
        *self.clipboard.borrow_mut() = text.to_string();
        Ok(())
    }
}

/// Scanner that returns a fixed repository map, ignoring the root.
pub struct StaticScanner {
    repos: BTreeMap<String, RepoInfo>,
}

impl StaticScanner {
    pub fn new(repos: BTreeMap<String, RepoInfo>) -> Self {
        Self { repos }
    }

    /// One healthy repo per name, rooted under `/tmp`.
    pub fn with_names(names: &[&str]) -> Self {
        let repos = names
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    RepoInfo {
                        path: format!("/tmp/{name}"),
                        branch: Some("main".to_string()),
                        head: Some("abc12345".to_string()),
                        scan_error: None,
                    },
                )
            })
            .collect();
        Self { repos }
    }
}

impl VcsScanner for StaticScanner {
    fn scan(&self, _root: &Path) -> BTreeMap<String, RepoInfo> {
        self.repos.clone()
    }
}

/// Reasoner answering from a queue; panics when called once too often.
pub struct ScriptedReasoner {
    responses: RefCell<VecDeque<Option<TaskEnvelope>>>,
}

impl ScriptedReasoner {
    pub fn new(responses: Vec<Option<TaskEnvelope>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
        }
    }

    pub fn assert_drained(&self) {
        assert!(
            self.responses.borrow().is_empty(),
            "scripted reasoner has unused responses"
        );
    }
}

impl Reasoner for ScriptedReasoner {
    fn select(&self, _items: &[WorkItem], _ctx: &ReasonContext) -> Option<TaskEnvelope> {
        self.responses
            .borrow_mut()
            .pop_front()
            .expect("unexpected reasoner call")
    }
}

/// Trace sink collecting events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: RefCell<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|event| event.name.clone())
            .collect()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, event: &TraceEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Build a task envelope the way the reasoner's fallback does.
pub fn envelope(intent: &str, target: &str, message: &str) -> TaskEnvelope {
    let mut payload = BTreeMap::new();
    payload.insert("message".to_string(), json!(message));
    payload.insert(
        "copy_scope".to_string(),
        json!({ "mode": "last_n", "n": 10 }),
    );
    TaskEnvelope {
        kind: "desktop_task".to_string(),
        intent: intent.to_string(),
        target: target.to_string(),
        payload,
        details: BTreeMap::new(),
        meta: BTreeMap::new(),
    }
}

/// Work item with deterministic defaults.
pub fn work_item(task_id: &str, repo_name: &str) -> WorkItem {
    WorkItem {
        task_id: task_id.to_string(),
        repo_name: repo_name.to_string(),
        action: "post_status".to_string(),
        message: format!("status update for {repo_name}"),
        target: None,
        copy_last_n: 10,
    }
}
