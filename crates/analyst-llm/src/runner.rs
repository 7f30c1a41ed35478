//! Agent runner contract
//!
//! A runner turns one instruction into one answer. It is configured per
//! call with a [`RunnerSpec`]: the model role to use, the node's system
//! prompt and the tools the node may call.

use crate::Result;
use analyst_core::{ModelRole, Tool};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Per-task runner configuration
#[derive(Clone)]
pub struct RunnerSpec {
    pub role: ModelRole,
    pub system_prompt: String,
    pub tools: Vec<Arc<dyn Tool>>,
}

impl RunnerSpec {
    pub fn new(role: ModelRole, system_prompt: impl Into<String>) -> Self {
        Self {
            role,
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }
}

impl fmt::Debug for RunnerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSpec")
            .field("role", &self.role)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("tools", &self.tool_names())
            .finish()
    }
}

/// Executes one model invocation, including any tool round-trips
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run `instruction` under `spec` and return the final answer text
    async fn invoke(&self, spec: &RunnerSpec, instruction: &str) -> Result<String>;
}
