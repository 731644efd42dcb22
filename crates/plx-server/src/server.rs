//! Stdio request loop: newline-framed JSON-RPC in, responses out.
//!
//! Owns the search bridge and dispatches the MCP methods. Every failure is
//! answered as a structured error; nothing here terminates the process.

use crate::bridge::SearchBridge;
use plx_core::codec::{encode_message, LineDecoder};
use plx_core::messages::{InitializeResult, ToolsListResult};
use plx_core::rpc::JSONRPC_VERSION;
use plx_core::{BridgeError, BridgeResult, JsonRpcRequest, JsonRpcResponse, RpcError};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// The MCP stdio server instance.
pub struct McpServer {
    /// Bridge handling tool listing and invocation.
    bridge: SearchBridge,
}

impl McpServer {
    /// Create a server over the given bridge.
    pub fn new(bridge: SearchBridge) -> Self {
        Self { bridge }
    }

    /// Serve requests from stdin until the client disconnects (EOF).
    ///
    /// Responses go to stdout; logs go to stderr so the protocol stream
    /// stays clean.
    pub async fn run(&self) -> BridgeResult<()> {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; 4096];

        info!("serving MCP over stdio");

        loop {
            let n = stdin.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            for line in decoder.feed(&buf[..n]) {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = self.handle_line(&line).await {
                    let frame = encode_message(&response)?;
                    stdout.write_all(&frame).await?;
                    stdout.flush().await?;
                }
            }
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Parse one frame and dispatch it. Returns `None` for notifications.
    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "failed to parse request");
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    RpcError::new(RpcError::PARSE_ERROR, e.to_string()),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            error!(got = %request.jsonrpc, "invalid JSON-RPC version");
            return Some(JsonRpcResponse::error(
                request.id,
                RpcError::with_data(
                    RpcError::INVALID_REQUEST,
                    "invalid JSON-RPC version",
                    json!({"expected": JSONRPC_VERSION, "got": request.jsonrpc}),
                ),
            ));
        }

        self.dispatch(request).await
    }

    /// Route a request to its handler and wrap the outcome in a response.
    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        debug!(method = %request.method, "incoming request");

        let result: Result<Value, RpcError> = match request.method.as_str() {
            "initialize" => self.handle_initialize().map_err(RpcError::from),
            "notifications/initialized" | "initialized" => Ok(json!({})),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list().map_err(RpcError::from),
            "tools/call" => self.handle_tools_call(&request.params).await.map_err(RpcError::from),
            other => Err(RpcError::new(
                RpcError::METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        };

        if is_notification {
            if let Err(e) = result {
                warn!(method = %request.method, error = %e.message, "notification handling failed");
            }
            return None;
        }

        Some(match result {
            Ok(value) => {
                info!(method = %request.method, "request completed");
                JsonRpcResponse::success(request.id, value)
            }
            Err(e) => {
                warn!(method = %request.method, code = e.code, error = %e.message, "request failed");
                JsonRpcResponse::error(request.id, e)
            }
        })
    }

    fn handle_initialize(&self) -> BridgeResult<Value> {
        let result = InitializeResult::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        Ok(serde_json::to_value(result)?)
    }

    fn handle_tools_list(&self) -> BridgeResult<Value> {
        let result = ToolsListResult {
            tools: self.bridge.list_tools(),
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_tools_call(&self, params: &Value) -> BridgeResult<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidParams("missing 'name' parameter".to_string()))?;
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let result = self.bridge.call(name, &arguments).await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use crate::upstream::PerplexityClient;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(upstream: &MockServer, api_key: Option<&str>) -> McpServer {
        McpServer::new(SearchBridge::new(
            ToolRegistry::builtin(),
            PerplexityClient::new(upstream.uri(), "sonar", Duration::from_secs(5)),
            api_key.map(String::from),
        ))
    }

    async fn idle_upstream() -> MockServer {
        MockServer::start().await
    }

    #[tokio::test]
    async fn initialize_advertises_tools_capability() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["result"]["protocolVersion"], "2024-11-05");
        assert!(wire["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_returns_single_stable_descriptor() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));
        let line = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;

        let first = serde_json::to_value(server.handle_line(line).await.unwrap()).unwrap();
        let second = serde_json::to_value(server.handle_line(line).await.unwrap()).unwrap();

        assert_eq!(first["result"]["tools"].as_array().unwrap().len(), 1);
        assert_eq!(first["result"]["tools"][0]["name"], "perplexity_search");
        assert_eq!(first["result"], second["result"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_request() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"web_search","arguments":{"query":"x"}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn missing_credential_is_invalid_request() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, None);

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"perplexity_search","arguments":{"query":"x"}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn non_string_query_is_invalid_params() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"perplexity_search","arguments":{"query":7}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn successful_call_returns_text_content() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "answer"}}],
            })))
            .mount(&upstream)
            .await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"perplexity_search","arguments":{"query":"test"}}}"#,
            )
            .await
            .unwrap();
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["result"]["content"][0]["type"], "text");
        assert_eq!(wire["result"]["content"][0]["text"], "answer");
    }

    #[tokio::test]
    async fn upstream_failure_carries_status_code() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&upstream)
            .await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"perplexity_search","arguments":{"query":"test"}}}"#,
            )
            .await
            .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, RpcError::UPSTREAM_ERROR);
        assert!(err.message.contains("500"));
    }

    #[tokio::test]
    async fn malformed_upstream_body_is_internal_error() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})),
            )
            .mount(&upstream)
            .await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"perplexity_search","arguments":{"query":"test"}}}"#,
            )
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn garbage_line_is_parse_error() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server.handle_line("{not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::PARSE_ERROR);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_rejected() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(r#"{"jsonrpc":"1.0","id":10,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, RpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let upstream = idle_upstream().await;
        let server = server_for(&upstream, Some("key"));

        let resp = server
            .handle_line(r#"{"jsonrpc":"2.0","id":11,"method":"ping"}"#)
            .await
            .unwrap();
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["result"], serde_json::json!({}));
    }
}
