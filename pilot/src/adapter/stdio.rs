//! Persistent stdio transport speaking line-delimited JSON-RPC.
//!
//! Spawns the surface command once, writes one request per line to its
//! stdin, and drains its stdout from a dedicated reader thread so a slow or
//! chatty surface can never deadlock the caller. Responses are correlated by
//! id; frames that fail to decode are dropped with a warning and the waiting
//! call surfaces as a timeout.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::adapter::rpc::{self, PROTOCOL_VERSION, RpcRequest, RpcResponse};
use crate::adapter::{AdapterError, OpKind, Transport};

pub struct StdioTransport {
    inner: Mutex<StdioInner>,
}

struct StdioInner {
    child: Child,
    stdin: ChildStdin,
    responses: Receiver<RpcResponse>,
    next_id: u64,
}

impl StdioTransport {
    /// Spawn the surface command and perform the `initialize` handshake.
    #[instrument(skip_all, fields(command = command.first().map(String::as_str).unwrap_or("")))]
    pub fn connect(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("adapter command must not be empty")?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn adapter command '{program}'"))?;

        let stdin = child
            .stdin
            .take()
            .context("adapter stdin was not piped")?;
        let stdout = child
            .stdout
            .take()
            .context("adapter stdout was not piped")?;
        let (tx, rx) = channel();
        thread::spawn(move || read_frames(stdout, &tx));

        let transport = Self {
            inner: Mutex::new(StdioInner {
                child,
                stdin,
                responses: rx,
                next_id: 1,
            }),
        };
        let greeting = transport
            .roundtrip(
                "initialize",
                json!({ "protocol_version": PROTOCOL_VERSION }),
                timeout,
                OpKind::EnumerateTargets,
            )
            .map_err(|err| anyhow!("initialize handshake failed: {err}"))?;
        debug!(greeting = %greeting, "adapter initialized");
        Ok(transport)
    }

    fn roundtrip(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
        operation: OpKind,
    ) -> Result<Value, AdapterError> {
        let mut inner = self.inner.lock().map_err(|_| AdapterError::Transport {
            operation,
            message: "transport lock poisoned".to_string(),
        })?;
        let id = inner.next_id;
        inner.next_id += 1;

        let request = RpcRequest::new(id, method, params);
        let mut frame = serde_json::to_string(&request).map_err(|err| AdapterError::Transport {
            operation,
            message: format!("encode request: {err}"),
        })?;
        frame.push('\n');
        inner
            .stdin
            .write_all(frame.as_bytes())
            .and_then(|()| inner.stdin.flush())
            .map_err(|err| AdapterError::Transport {
                operation,
                message: format!("write request: {err}"),
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AdapterError::Transport {
                    operation,
                    message: format!("no response within {}ms", timeout.as_millis()),
                });
            }
            match inner.responses.recv_timeout(remaining) {
                Ok(response) if response.id == id => return rpc::response_result(response, operation),
                Ok(stale) => {
                    debug!(stale_id = stale.id, expected = id, "dropping stale adapter response");
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(AdapterError::Transport {
                        operation,
                        message: format!("no response within {}ms", timeout.as_millis()),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AdapterError::Transport {
                        operation,
                        message: "adapter process closed its stdout".to_string(),
                    });
                }
            }
        }
    }
}

impl Transport for StdioTransport {
    fn call(
        &self,
        operation: OpKind,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AdapterError> {
        self.roundtrip(operation.method(), params, timeout, operation)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Err(err) = inner.child.kill() {
                debug!(err = %err, "adapter child already gone");
            }
            if let Err(err) = inner.child.wait() {
                debug!(err = %err, "could not reap adapter child");
            }
        }
    }
}

fn read_frames(stdout: ChildStdout, tx: &Sender<RpcResponse>) {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(err = %err, "adapter stdout read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RpcResponse>(&line) {
            Ok(response) => {
                if tx.send(response).is_err() {
                    break;
                }
            }
            Err(err) => warn!(err = %err, "dropping undecodable adapter frame"),
        }
    }
}
