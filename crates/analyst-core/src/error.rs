//! Error types for analyst-core
//!
//! Errors are split by the moment they can occur: [`ConfigError`] is raised
//! while resolving the active node set (before any task runs), [`TaskError`]
//! is the cause category reported by a single task, and [`GraphError`] is
//! what a pipeline run returns to its caller.

use crate::node::NodeId;
use thiserror::Error;

/// Result type alias for analyst-core
pub type Result<T> = std::result::Result<T, GraphError>;

/// Invalid pipeline configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Identifier outside the closed node catalogue
    #[error("unknown analyst '{0}' (expected one of: news, technical, fundamentals, growth, valuation)")]
    UnknownNode(String),

    /// Identifier names a node that always runs and cannot be selected
    #[error("node '{0}' always runs and cannot be selected as an analyst")]
    NotSelectable(String),

    /// Identifier selected more than once
    #[error("analyst '{0}' selected more than once")]
    DuplicateNode(String),

    /// Malformed configuration value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure category of a single task's external call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The remote model call failed
    #[error("model error: {0}")]
    Model(String),

    /// A tool invocation failed
    #[error("tool error: {0}")]
    Tool(String),

    /// The external call did not finish in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote tool service could not be reached
    #[error("tool catalog unavailable: {0}")]
    ToolCatalogUnavailable(String),

    /// The task panicked or was aborted by the runtime
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Short category name, stable across messages
    pub fn category(&self) -> &'static str {
        match self {
            TaskError::Model(_) => "model",
            TaskError::Tool(_) => "tool",
            TaskError::Timeout(_) => "timeout",
            TaskError::ToolCatalogUnavailable(_) => "tool_catalog_unavailable",
            TaskError::Internal(_) => "internal",
        }
    }
}

/// Error returned by a pipeline run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Bad configuration, raised before any task executes
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A task failed during execution
    #[error("node '{node}' failed: {cause}")]
    NodeExecution {
        /// Node that failed
        node: NodeId,
        /// Underlying cause
        cause: TaskError,
    },

    /// Structurally invalid graph or record
    #[error("aggregation error: {0}")]
    Aggregation(String),

    /// The caller cancelled the run
    #[error("run cancelled")]
    Cancelled,
}

impl GraphError {
    /// Build a node execution error
    pub fn node(node: NodeId, cause: TaskError) -> Self {
        GraphError::NodeExecution { node, cause }
    }

    /// The failing node, if this error came from a task
    pub fn failed_node(&self) -> Option<NodeId> {
        match self {
            GraphError::NodeExecution { node, .. } => Some(*node),
            _ => None,
        }
    }
}
