//! JSON-RPC 2.0 envelope types for the MCP stdio transport.
//!
//! The bridge models failures as [`BridgeError`] internally; conversion to
//! the wire error shape happens here, at the protocol boundary only.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// An incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Request id. Absent (null) for notifications.
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Notifications carry no id and must not be answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// An outgoing JSON-RPC response: either `result` or `error`, never both.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured JSON-RPC error: numeric code + human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Server-defined code for upstream HTTP failures.
    pub const UPSTREAM_ERROR: i64 = -32000;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl From<BridgeError> for RpcError {
    fn from(e: BridgeError) -> Self {
        let code = match &e {
            BridgeError::UnknownTool(_) | BridgeError::MissingCredential => {
                RpcError::INVALID_REQUEST
            }
            BridgeError::InvalidParams(_) => RpcError::INVALID_PARAMS,
            BridgeError::UpstreamStatus(_) | BridgeError::UpstreamRequest(_) => {
                RpcError::UPSTREAM_ERROR
            }
            BridgeError::MalformedResponse(_) | BridgeError::Io(_) | BridgeError::Other(_) => {
                RpcError::INTERNAL_ERROR
            }
        };
        RpcError::new(code, e.to_string())
    }
}
