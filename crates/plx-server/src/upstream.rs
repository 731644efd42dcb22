//! Upstream Perplexity client: one chat-completion POST per search.
//!
//! No retries and no caching; a transient upstream failure surfaces
//! directly to the caller as a bridge error.

use plx_core::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

/// HTTP client for the Perplexity chat-completion endpoint.
pub struct PerplexityClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl PerplexityClient {
    /// Create a client with the given endpoint, model, and request timeout.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Issue one search request and return the first choice's answer text.
    pub async fn search(&self, api_key: &str, query: &str) -> BridgeResult<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(url = %url, model = %self.model, "forwarding search query upstream");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: query,
            }],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::UpstreamRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "upstream returned non-success status");
            return Err(BridgeError::UpstreamStatus(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::MalformedResponse("no choices in response".into()))?;

        Ok(choice.message.content)
    }
}
