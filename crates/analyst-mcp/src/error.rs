//! Error types for MCP operations

use analyst_core::TaskError;
use thiserror::Error;

/// Errors that can occur during MCP operations
#[derive(Error, Debug)]
pub enum McpError {
    /// The tool service could not be reached
    #[error("MCP service unavailable: {0}")]
    Unavailable(String),

    /// A request did not complete within the transport timeout
    #[error("MCP request timed out: {0}")]
    Timeout(String),

    /// MCP request failed
    #[error("MCP request failed: {0}")]
    RequestFailed(String),

    /// MCP tool call failed
    #[error("MCP tool call failed: {0}")]
    ToolCallFailed(String),

    /// The server answered with something that is not a JSON-RPC reply
    #[error("Invalid MCP response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl McpError {
    /// Classify a transport-level reqwest failure
    pub(crate) fn from_reqwest(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            McpError::Timeout(format!("{context}: {err}"))
        } else if err.is_connect() {
            McpError::Unavailable(format!("{context}: {err}"))
        } else {
            McpError::RequestFailed(format!("{context}: {err}"))
        }
    }

    /// Classify a non-success HTTP status
    ///
    /// Only server-side failures make the service unavailable. A rejected
    /// token or a malformed request is a failed request.
    pub(crate) fn from_status(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {status} for {context}: {body}");
        if status.is_server_error() {
            McpError::Unavailable(detail)
        } else {
            McpError::RequestFailed(detail)
        }
    }
}

/// Convert McpError to the task failure category
impl From<McpError> for TaskError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Unavailable(_) => TaskError::ToolCatalogUnavailable(err.to_string()),
            McpError::Timeout(_) => TaskError::Timeout(err.to_string()),
            _ => TaskError::Tool(err.to_string()),
        }
    }
}
