//! Error types for LLM operations

use analyst_core::TaskError;
use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// The model asked for a tool it was not given
    #[error("Model requested unknown tool '{0}'")]
    UnknownTool(String),

    /// A tool invoked on the model's behalf failed
    #[error("Tool '{name}' failed: {source}")]
    ToolFailed {
        name: String,
        #[source]
        source: TaskError,
    },

    /// No final answer within the iteration limit
    #[error("No final answer after {0} iterations")]
    MaxIterations(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}

/// Convert LlmError to the task failure category
impl From<LlmError> for TaskError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(_) => TaskError::Timeout(err.to_string()),
            LlmError::ToolFailed { source, .. } => source,
            other => TaskError::Model(other.to_string()),
        }
    }
}
