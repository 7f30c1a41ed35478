//! Tool trait definition

use crate::error::TaskError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A remote tool a node's runner may call
///
/// Tools are listed by a tool catalog and handed to the runner after being
/// filtered down to the names the node declares.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invoke the tool with arguments produced by the model
    ///
    /// # Returns
    ///
    /// The tool's textual output, passed back to the model verbatim
    async fn call(&self, arguments: Value) -> Result<String, TaskError>;

    /// Tool name, matched exactly against node declarations
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// Input schema (JSON Schema format)
    fn input_schema(&self) -> Value;
}

/// Keep only the tools whose name appears in `names`
///
/// Order follows the catalog. Names with no matching tool are ignored.
pub fn select_tools(all: &[Arc<dyn Tool>], names: &[&str]) -> Vec<Arc<dyn Tool>> {
    all.iter()
        .filter(|tool| names.contains(&tool.name()))
        .cloned()
        .collect()
}
