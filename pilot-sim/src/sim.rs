//! In-memory automation surface served over JSON-RPC.
//!
//! The simulator keeps a fixed window list, one clipboard, and a keystroke
//! journal. Scripted failures answer the first N calls of an operation with
//! a busy error so retry and breaker behavior can be exercised end to end.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use pilot::adapter::Target;
use pilot::adapter::rpc::{CODE_BUSY, CODE_TARGET_NOT_FOUND, PROTOCOL_VERSION, RpcRequest, RpcResponse};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

pub struct SimState {
    targets: Vec<Target>,
    clipboard: String,
    keystrokes: Vec<String>,
    focused: Option<String>,
    snapshot_seq: u32,
    snapshot_dir: Option<PathBuf>,
    failures: BTreeMap<String, u32>,
}

impl SimState {
    pub fn new(
        titles: &[String],
        failures: BTreeMap<String, u32>,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        let targets = titles
            .iter()
            .enumerate()
            .map(|(idx, title)| Target {
                id: format!("w{}", idx + 1),
                title: title.clone(),
            })
            .collect();
        Self {
            targets,
            clipboard: String::new(),
            keystrokes: Vec::new(),
            focused: None,
            snapshot_seq: 0,
            snapshot_dir,
            failures,
        }
    }

    pub fn keystrokes(&self) -> &[String] {
        &self.keystrokes
    }

    pub fn clipboard(&self) -> &str {
        &self.clipboard
    }

    /// Answer one request line. Undecodable lines get a parse-error response
    /// with id 0; the transport on the other side discards unknown ids.
    pub fn handle_line(&mut self, line: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => return RpcResponse::error(0, PARSE_ERROR, &format!("parse error: {err}")),
        };
        self.handle(request)
    }

    fn handle(&mut self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        if request.method == "initialize" {
            return RpcResponse::result(
                id,
                json!({
                    "protocol_version": PROTOCOL_VERSION,
                    "server": concat!("pilot-sim ", env!("CARGO_PKG_VERSION")),
                }),
            );
        }
        if self.take_failure(&request.method) {
            return RpcResponse::error(id, CODE_BUSY, "injected failure");
        }
        match request.method.as_str() {
            "enumerate_targets" => RpcResponse::result(id, json!({ "targets": self.targets })),
            "focus" => match self.lookup(id, &request.params) {
                Ok(target) => {
                    self.focused = Some(target.id);
                    RpcResponse::result(id, json!({ "ok": true }))
                }
                Err(response) => response,
            },
            "capture_snapshot" => match self.lookup(id, &request.params) {
                Ok(target) => self.snapshot(id, &target),
                Err(response) => response,
            },
            "send_keys" => {
                let Some(keys) = str_param(&request.params, "keys") else {
                    return RpcResponse::error(id, INVALID_PARAMS, "missing 'keys'");
                };
                match self.lookup(id, &request.params) {
                    Ok(target) => {
                        self.keystrokes.push(format!("{} {keys}", target.id));
                        RpcResponse::result(id, json!({ "ok": true }))
                    }
                    Err(response) => response,
                }
            }
            "get_clipboard" => RpcResponse::result(id, json!({ "text": self.clipboard })),
            "set_clipboard" => {
                let Some(text) = str_param(&request.params, "text") else {
                    return RpcResponse::error(id, INVALID_PARAMS, "missing 'text'");
                };
                self.clipboard = text.to_string();
                RpcResponse::result(id, json!({ "ok": true }))
            }
            method => RpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                &format!("method not found: {method}"),
            ),
        }
    }

    fn take_failure(&mut self, method: &str) -> bool {
        match self.failures.get_mut(method) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn lookup(&self, id: u64, params: &Value) -> Result<Target, RpcResponse> {
        let Some(target_id) = str_param(params, "id") else {
            return Err(RpcResponse::error(id, INVALID_PARAMS, "missing 'id'"));
        };
        self.targets
            .iter()
            .find(|target| target.id == target_id)
            .cloned()
            .ok_or_else(|| {
                RpcResponse::error(
                    id,
                    CODE_TARGET_NOT_FOUND,
                    &format!("no target '{target_id}'"),
                )
            })
    }

    fn snapshot(&mut self, id: u64, target: &Target) -> RpcResponse {
        self.snapshot_seq += 1;
        let seq = self.snapshot_seq;
        let Some(dir) = self.snapshot_dir.as_ref() else {
            return RpcResponse::result(id, json!({ "uri": format!("sim://snap-{seq}") }));
        };
        let path = dir.join(format!("snap-{seq}.txt"));
        let contents = format!(
            "target: {} ({})\nfocused: {}\nkeystrokes: {}\nclipboard_chars: {}\n",
            target.id,
            target.title,
            self.focused.as_deref().unwrap_or("-"),
            self.keystrokes.len(),
            self.clipboard.len(),
        );
        match fs::create_dir_all(dir).and_then(|()| fs::write(&path, contents)) {
            Ok(()) => RpcResponse::result(id, json!({ "uri": path.display().to_string() })),
            Err(err) => RpcResponse::error(
                id,
                SERVER_ERROR,
                &format!("write snapshot {}: {err}", path.display()),
            ),
        }
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Parse repeated `--fail op=N` specs into a per-operation budget.
pub fn parse_failures(specs: &[String]) -> Result<BTreeMap<String, u32>> {
    let mut failures = BTreeMap::new();
    for spec in specs {
        let (op, count) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --fail spec '{spec}', expected op=N"))?;
        let count: u32 = count
            .parse()
            .with_context(|| format!("invalid --fail count in '{spec}'"))?;
        *failures.entry(op.to_string()).or_insert(0) += count;
    }
    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(titles: &[&str]) -> SimState {
        let titles: Vec<String> = titles.iter().map(|t| (*t).to_string()).collect();
        SimState::new(&titles, BTreeMap::new(), None)
    }

    fn call(state: &mut SimState, id: u64, method: &str, params: Value) -> RpcResponse {
        let line = serde_json::to_string(&RpcRequest::new(id, method, params)).expect("encode");
        state.handle_line(&line)
    }

    fn result(response: RpcResponse) -> Value {
        assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
        response.result.expect("result")
    }

    #[test]
    fn initialize_announces_the_protocol() {
        let mut state = sim(&["notes"]);
        let value = result(call(&mut state, 1, "initialize", json!({})));
        assert_eq!(value["protocol_version"], json!(PROTOCOL_VERSION));
    }

    #[test]
    fn session_journals_keystrokes_and_clipboard() {
        let mut state = sim(&["notes - Visual Studio Code"]);

        let targets = result(call(&mut state, 1, "enumerate_targets", json!({})));
        assert_eq!(targets["targets"][0]["id"], json!("w1"));

        result(call(&mut state, 2, "focus", json!({ "id": "w1" })));
        result(call(&mut state, 3, "set_clipboard", json!({ "text": "status: hi" })));
        result(call(&mut state, 4, "send_keys", json!({ "id": "w1", "keys": "ctrl+v" })));

        let text = result(call(&mut state, 5, "get_clipboard", json!({})));
        assert_eq!(text["text"], json!("status: hi"));
        assert_eq!(state.keystrokes(), ["w1 ctrl+v"]);
        assert_eq!(state.clipboard(), "status: hi");
    }

    #[test]
    fn unknown_target_answers_1001() {
        let mut state = sim(&["notes"]);
        let response = call(&mut state, 1, "focus", json!({ "id": "w9" }));
        let error = response.error.expect("error");
        assert_eq!(error.code, CODE_TARGET_NOT_FOUND);
    }

    #[test]
    fn injected_failures_burn_down_then_clear() {
        let titles = vec!["notes".to_string()];
        let failures = parse_failures(&["enumerate_targets=2".to_string()]).expect("parse");
        let mut state = SimState::new(&titles, failures, None);

        for id in 1..=2 {
            let response = call(&mut state, id, "enumerate_targets", json!({}));
            assert_eq!(response.error.expect("busy").code, CODE_BUSY);
        }
        result(call(&mut state, 3, "enumerate_targets", json!({})));
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let mut state = sim(&["notes"]);
        let response = call(&mut state, 1, "reboot", json!({}));
        assert_eq!(response.error.expect("error").code, METHOD_NOT_FOUND);
    }

    #[test]
    fn undecodable_line_gets_a_parse_error() {
        let mut state = sim(&["notes"]);
        let response = state.handle_line("{ not json");
        assert_eq!(response.error.expect("error").code, PARSE_ERROR);
        assert_eq!(response.id, 0);
    }

    #[test]
    fn snapshots_become_files_when_a_dir_is_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let titles = vec!["notes".to_string()];
        let mut state = SimState::new(
            &titles,
            BTreeMap::new(),
            Some(dir.path().to_path_buf()),
        );

        let value = result(call(&mut state, 1, "capture_snapshot", json!({ "id": "w1" })));
        let uri = value["uri"].as_str().expect("uri");
        assert!(uri.ends_with("snap-1.txt"));
        let contents = fs::read_to_string(uri).expect("read snapshot");
        assert!(contents.contains("notes"));
    }

    #[test]
    fn fail_specs_accumulate_per_operation() {
        let failures = parse_failures(&[
            "focus=1".to_string(),
            "focus=2".to_string(),
        ])
        .expect("parse");
        assert_eq!(failures["focus"], 3);

        assert!(parse_failures(&["focus".to_string()]).is_err());
        assert!(parse_failures(&["focus=x".to_string()]).is_err());
    }
}
