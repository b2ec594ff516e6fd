//! JSON-RPC 2.0 framing shared by the surface transports.
//!
//! Frames are single lines of JSON. Requests and responses are correlated by
//! numeric id; the well-known application error codes below map onto the
//! adapter error taxonomy, everything else is malformed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::{AdapterError, OpKind};

/// Version announced during the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Requested target does not exist on the surface.
pub const CODE_TARGET_NOT_FOUND: i64 = 1001;
/// Surface is alive but busy; the caller may retry.
pub const CODE_BUSY: i64 = 1002;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Unpack a decoded response into the adapter error taxonomy.
pub fn response_result(response: RpcResponse, operation: OpKind) -> Result<Value, AdapterError> {
    if let Some(error) = response.error {
        return Err(match error.code {
            CODE_TARGET_NOT_FOUND => AdapterError::TargetNotFound {
                message: error.message,
            },
            CODE_BUSY => AdapterError::Busy {
                operation,
                message: error.message,
            },
            code => AdapterError::Malformed {
                operation,
                message: format!("server error {code}: {}", error.message),
            },
        });
    }
    response.result.ok_or_else(|| AdapterError::Malformed {
        operation,
        message: "response carries neither result nor error".to_string(),
    })
}
