//! McpTool wrapper that implements the Tool trait

use crate::client::{McpHttpClient, ToolDefinition};
use crate::error::McpError;
use analyst_core::{TaskError, Tool};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A tool offered by the remote tool service
///
/// Calls are delegated to the shared client; a result flagged as an error
/// by the server becomes a [`TaskError::Tool`].
pub struct McpTool {
    definition: ToolDefinition,
    client: Arc<McpHttpClient>,
}

impl McpTool {
    pub fn new(definition: ToolDefinition, client: Arc<McpHttpClient>) -> Self {
        Self { definition, client }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }
}

#[async_trait]
impl Tool for McpTool {
    async fn call(&self, arguments: Value) -> Result<String, TaskError> {
        debug!(tool = %self.definition.name, "Calling remote tool");

        let result = self
            .client
            .call_tool(&self.definition.name, arguments)
            .await?;

        if result.is_error {
            return Err(McpError::ToolCallFailed(format!(
                "tool '{}' returned error: {}",
                self.definition.name,
                result.text()
            ))
            .into());
        }

        Ok(result.text())
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        self.definition.description.as_deref().unwrap_or("")
    }

    fn input_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }
}
