use thiserror::Error;

/// Errors produced by the search bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("no upstream credential configured")]
    MissingCredential,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("upstream error: status {0}")]
    UpstreamStatus(u16),

    #[error("upstream request failed: {0}")]
    UpstreamRequest(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Other(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
