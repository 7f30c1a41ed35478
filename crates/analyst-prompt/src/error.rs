//! Error types for prompt operations

use analyst_core::TaskError;
use thiserror::Error;

/// Result type for prompt operations
pub type Result<T> = std::result::Result<T, PromptError>;

/// Errors that can occur during prompt operations
#[derive(Error, Debug)]
pub enum PromptError {
    /// No template registered under this name
    #[error("Template '{0}' not registered")]
    TemplateNotRegistered(String),

    /// Template rendering failed
    #[error("Failed to render template '{name}': {detail}")]
    RenderError { name: String, detail: String },
}

/// A prompt that cannot be rendered fails the task before any model call
impl From<PromptError> for TaskError {
    fn from(err: PromptError) -> Self {
        TaskError::Model(err.to_string())
    }
}
