//! Automation-surface client and transports.
//!
//! [`DesktopSurface`] is the narrow seam between nodes and the external
//! desktop-automation service. [`AdapterClient`](client::AdapterClient)
//! implements it over a [`Transport`], adding timeouts, retry with backoff,
//! and per-operation circuit breaking. Tests substitute scripted surfaces
//! without touching a transport.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod client;
pub mod oneshot;
pub mod rpc;
pub mod stdio;

/// A focusable window-like target on the automation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub title: String,
}

/// Operation classes, used for breaker accounting and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    EnumerateTargets,
    Focus,
    CaptureSnapshot,
    SendKeys,
    GetClipboard,
    SetClipboard,
}

impl OpKind {
    /// Wire method name for the operation.
    pub fn method(self) -> &'static str {
        match self {
            Self::EnumerateTargets => "enumerate_targets",
            Self::Focus => "focus",
            Self::CaptureSnapshot => "capture_snapshot",
            Self::SendKeys => "send_keys",
            Self::GetClipboard => "get_clipboard",
            Self::SetClipboard => "set_clipboard",
        }
    }

    /// Mutating operations have observable side effects on the target and
    /// are dispatched at most once per Act invocation.
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::SendKeys | Self::SetClipboard)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Classified failure from a surface call.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Surface unreachable or the call timed out; retryable for read ops.
    #[error("transport failure on {operation}: {message}")]
    Transport { operation: OpKind, message: String },
    /// Surface answered but is busy or not ready; retryable for read ops.
    #[error("surface busy on {operation}: {message}")]
    Busy { operation: OpKind, message: String },
    /// No matching target; not retryable, Recover must re-resolve first.
    #[error("target not found: {message}")]
    TargetNotFound { message: String },
    /// Circuit open for this operation class; failing fast without a call.
    #[error("circuit open for {operation}")]
    CircuitOpen { operation: OpKind },
    /// Decodable response with the wrong shape, or a server-side error the
    /// taxonomy has no better class for; not retryable.
    #[error("malformed response on {operation}: {message}")]
    Malformed { operation: OpKind, message: String },
}

impl AdapterError {
    /// Transient errors may be retried by the client (read-only ops only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Busy { .. })
    }
}

/// Request/response channel to the surface, chosen by configuration.
pub trait Transport {
    fn call(
        &self,
        operation: OpKind,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AdapterError>;
}

/// Narrow interface nodes use to reach the automation surface.
///
/// `capture_snapshot` returns an evidence reference (path or URI), never
/// pixel bytes; the gate wraps it with its evidence kind.
pub trait DesktopSurface {
    fn enumerate_targets(&self) -> Result<Vec<Target>, AdapterError>;
    fn focus(&self, target: &Target) -> Result<(), AdapterError>;
    fn capture_snapshot(&self, target: &Target) -> Result<String, AdapterError>;
    fn send_keys(&self, target: &Target, keys: &str) -> Result<(), AdapterError>;
    fn get_clipboard(&self) -> Result<String, AdapterError>;
    fn set_clipboard(&self, text: &str) -> Result<(), AdapterError>;
}
