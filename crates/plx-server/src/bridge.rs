//! Search bridge: validates tool invocations and forwards them upstream.
//!
//! The bridge owns the registry, the upstream client, and the resolved
//! credential. All failure paths come back as [`BridgeError`] values; the
//! transport layer turns them into protocol errors.

use crate::registry::{ToolHandler, ToolRegistry};
use crate::upstream::PerplexityClient;
use plx_core::{BridgeError, BridgeResult, CallToolResult, ToolContent, ToolSpec};
use serde_json::Value;
use tracing::{debug, info};

/// Bridges MCP tool invocations to the upstream search API.
pub struct SearchBridge {
    registry: ToolRegistry,
    upstream: PerplexityClient,
    /// Credential resolved once at startup. `None` fails each call, not the
    /// process.
    api_key: Option<String>,
}

impl SearchBridge {
    /// Create a bridge over the given registry and upstream client.
    pub fn new(registry: ToolRegistry, upstream: PerplexityClient, api_key: Option<String>) -> Self {
        Self {
            registry,
            upstream,
            api_key,
        }
    }

    /// List all invocable tool specs, in registration order.
    pub fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// Invoke a named tool.
    ///
    /// Checks run in order: tool name, credential, arguments. A request
    /// rejected by any check never reaches the network.
    pub async fn call(&self, name: &str, arguments: &Value) -> BridgeResult<CallToolResult> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| BridgeError::UnknownTool(name.to_string()))?;

        let api_key = self
            .api_key
            .as_deref()
            .ok_or(BridgeError::MissingCredential)?;

        match tool.handler {
            ToolHandler::PerplexitySearch => {
                let query = arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        BridgeError::InvalidParams("'query' must be a string".to_string())
                    })?;

                debug!(tool = %name, query_len = query.len(), "dispatching search");
                let answer = self.upstream.search(api_key, query).await?;
                info!(tool = %name, answer_len = answer.len(), "search completed");

                Ok(CallToolResult {
                    content: vec![ToolContent::text(answer)],
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SEARCH_TOOL_NAME;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bridge_for(server: &MockServer, api_key: Option<&str>) -> SearchBridge {
        SearchBridge::new(
            ToolRegistry::builtin(),
            PerplexityClient::new(server.uri(), "sonar", Duration::from_secs(5)),
            api_key.map(String::from),
        )
    }

    /// Mount a mock that must never be hit; dropping the server verifies it.
    async fn upstream_expecting_no_calls() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_network_call() {
        let server = upstream_expecting_no_calls().await;
        let bridge = bridge_for(&server, Some("key"));

        let err = bridge
            .call("web_search", &json!({"query": "test"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn missing_credential_fails_regardless_of_arguments() {
        let server = upstream_expecting_no_calls().await;
        let bridge = bridge_for(&server, None);

        let err = bridge
            .call(SEARCH_TOOL_NAME, &json!({"query": "test"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingCredential));

        // Bad arguments too: the credential check runs first.
        let err = bridge.call(SEARCH_TOOL_NAME, &json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::MissingCredential));
    }

    #[tokio::test]
    async fn missing_query_is_invalid_params() {
        let server = upstream_expecting_no_calls().await;
        let bridge = bridge_for(&server, Some("key"));

        let err = bridge.call(SEARCH_TOOL_NAME, &json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn non_string_query_is_invalid_params() {
        let server = upstream_expecting_no_calls().await;
        let bridge = bridge_for(&server, Some("key"));

        let err = bridge
            .call(SEARCH_TOOL_NAME, &json!({"query": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn successful_call_wraps_answer_as_text_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "answer"}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let bridge = bridge_for(&server, Some("key"));
        let result = bridge
            .call(SEARCH_TOOL_NAME, &json!({"query": "test"}))
            .await
            .unwrap();

        assert_eq!(result.content, vec![ToolContent::text("answer")]);
    }

    #[tokio::test]
    async fn list_tools_is_idempotent() {
        let server = upstream_expecting_no_calls().await;
        let bridge = bridge_for(&server, None);

        let first = bridge.list_tools();
        let second = bridge.list_tools();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, SEARCH_TOOL_NAME);
        assert_eq!(first, second);
    }
}
