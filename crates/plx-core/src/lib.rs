//! plx-core: Shared protocol library for the Perplexity search bridge.
//!
//! Provides JSON-RPC 2.0 envelope types, MCP payload types, the
//! newline-delimited JSON codec, and the bridge error taxonomy.

pub mod codec;
pub mod error;
pub mod messages;
pub mod rpc;

// Re-export commonly used items at crate root.
pub use codec::{encode_message, LineDecoder};
pub use error::{BridgeError, BridgeResult};
pub use messages::{CallToolResult, InitializeResult, ToolContent, ToolSpec, PROTOCOL_VERSION};
pub use rpc::{JsonRpcRequest, JsonRpcResponse, RpcError};
