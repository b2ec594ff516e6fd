//! Spawn-per-call transport.
//!
//! Each call spawns the surface command fresh, writes a single JSON-RPC
//! request line to its stdin, and reads the response from the first
//! non-empty line of stdout. Slower than [`StdioTransport`] but immune to a
//! wedged adapter process carrying state between calls.
//!
//! [`StdioTransport`]: crate::adapter::stdio::StdioTransport

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::adapter::rpc::{self, RpcRequest, RpcResponse};
use crate::adapter::{AdapterError, OpKind, Transport};
use crate::io::process::feed_and_collect;

const OUTPUT_LIMIT_BYTES: usize = 262_144;

pub struct OneshotTransport {
    command: Vec<String>,
}

impl OneshotTransport {
    pub fn new(command: &[String]) -> Result<Self> {
        if command.is_empty() {
            anyhow::bail!("adapter command must not be empty");
        }
        Ok(Self {
            command: command.to_vec(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        cmd
    }
}

impl Transport for OneshotTransport {
    fn call(
        &self,
        operation: OpKind,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AdapterError> {
        let request = RpcRequest::new(1, operation.method(), params);
        let mut frame = serde_json::to_string(&request).map_err(|err| AdapterError::Transport {
            operation,
            message: format!("encode request: {err}"),
        })?;
        frame.push('\n');

        let output = feed_and_collect(self.command(), frame.into_bytes(), timeout, OUTPUT_LIMIT_BYTES)
            .map_err(|err| AdapterError::Transport {
                operation,
                message: format!("{err:#}"),
            })?;

        if output.timed_out {
            return Err(AdapterError::Transport {
                operation,
                message: format!("no response within {}ms", timeout.as_millis()),
            });
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Transport {
                operation,
                message: format!(
                    "adapter exited with {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| AdapterError::Malformed {
                operation,
                message: "adapter produced no response line".to_string(),
            })?;
        debug!(frame = line, "oneshot response");

        let response: RpcResponse =
            serde_json::from_str(line).map_err(|err| AdapterError::Malformed {
                operation,
                message: format!("decode response: {err}"),
            })?;
        if response.id != request.id {
            return Err(AdapterError::Malformed {
                operation,
                message: format!("response id {} does not match request", response.id),
            });
        }
        rpc::response_result(response, operation)
    }
}
