//! OpenAI-compatible runner
//!
//! Implements [`AgentRunner`] over the chat completions API
//! (`POST {api_base}/chat/completions`). Works with OpenAI and with any
//! server exposing the same API (vLLM, LM Studio, DashScope and others).
//!
//! The runner loops until the model answers without requesting tools:
//! 1. Send the conversation and the node's tool definitions
//! 2. If the model requests tool calls, run them and append the results
//! 3. Otherwise return the answer text
//!
//! # Example
//!
//! ```no_run
//! use analyst_core::ModelRole;
//! use analyst_llm::{AgentRunner, OpenAiRunner, RunnerSpec};
//! use analyst_utils::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = OpenAiRunner::from_config(&AppConfig::default())?;
//! let spec = RunnerSpec::new(ModelRole::Basic, "You are a market analyst.");
//!
//! let answer = runner.invoke(&spec, "Summarize AAPL for March 2025").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

use crate::runner::{AgentRunner, RunnerSpec};
use crate::{LlmError, Result};
use analyst_core::{ModelRole, Tool};
use analyst_utils::{AppConfig, ModelSettings};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Sends one chat completion request
#[async_trait]
pub(crate) trait ChatBackend: Send + Sync {
    async fn complete(&self, settings: &ModelSettings, request: &ChatRequest)
        -> Result<ChatResponse>;
}

/// Chat completions over HTTP
struct HttpChatBackend {
    client: Client,
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(
        &self,
        settings: &ModelSettings,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", settings.api_base.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(url)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .json(request);
        if let Some(api_key) = settings.resolve_api_key() {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await?;
            return Err(map_status(status, error_text, &request.model));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::UnexpectedResponse(format!("Failed to parse response: {e}")))
    }
}

/// Map a non-success HTTP status to an error
fn map_status(status: u16, error_text: String, model: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimitExceeded(error_text),
        400 => LlmError::InvalidRequest(error_text),
        404 => LlmError::ModelNotFound(model.to_string()),
        408 | 504 => LlmError::Timeout(format!("HTTP {status}: {error_text}")),
        _ => LlmError::RequestFailed(format!("HTTP {status}: {error_text}")),
    }
}

/// Runner backed by an OpenAI-compatible chat completions API
///
/// Each [`ModelRole`] has its own [`ModelSettings`]; a role missing from
/// the configuration uses the `basic` settings.
pub struct OpenAiRunner {
    backend: Arc<dyn ChatBackend>,
    settings: HashMap<ModelRole, ModelSettings>,
}

impl OpenAiRunner {
    /// Create a runner with the model settings of `config`
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_backend(
            Arc::new(HttpChatBackend { client }),
            config,
        ))
    }

    pub(crate) fn with_backend(backend: Arc<dyn ChatBackend>, config: &AppConfig) -> Self {
        let settings = [ModelRole::Basic, ModelRole::Reasoning, ModelRole::Vision]
            .into_iter()
            .map(|role| (role, config.model(role.as_str())))
            .collect();
        Self { backend, settings }
    }

    /// Settings used for `role`
    pub fn settings(&self, role: ModelRole) -> Option<&ModelSettings> {
        self.settings.get(&role)
    }

    async fn run_tool_calls(
        tools: &[Arc<dyn Tool>],
        calls: &[WireToolCall],
    ) -> Result<Vec<ChatMessage>> {
        let invocations = calls.iter().map(|call| async move {
            let tool = tools
                .iter()
                .find(|tool| tool.name() == call.function.name)
                .ok_or_else(|| LlmError::UnknownTool(call.function.name.clone()))?;

            let arguments = parse_arguments(&call.function.arguments)?;
            debug!(tool = %call.function.name, id = %call.id, "Executing tool call");

            let output = tool
                .call(arguments)
                .await
                .map_err(|source| LlmError::ToolFailed {
                    name: call.function.name.clone(),
                    source,
                })?;
            Ok::<_, LlmError>(ChatMessage::tool(call.id.clone(), output))
        });

        try_join_all(invocations).await
    }
}

#[async_trait]
impl AgentRunner for OpenAiRunner {
    #[instrument(skip_all, fields(role = spec.role.as_str()))]
    async fn invoke(&self, spec: &RunnerSpec, instruction: &str) -> Result<String> {
        let settings = self
            .settings
            .get(&spec.role)
            .ok_or_else(|| LlmError::ConfigurationError(format!("no model for role {}", spec.role.as_str())))?;

        let tools = (!spec.tools.is_empty()).then(|| convert_tools(&spec.tools));
        let mut messages = vec![
            ChatMessage::system(spec.system_prompt.clone()),
            ChatMessage::user(instruction.to_string()),
        ];

        for iteration in 1..=settings.max_iterations {
            debug!(
                iteration,
                max_iterations = settings.max_iterations,
                model = %settings.model,
                "Model iteration started"
            );

            let request = ChatRequest {
                model: settings.model.clone(),
                messages: messages.clone(),
                temperature: settings.temperature,
                tools: tools.clone(),
            };
            let response = self.backend.complete(settings, &request).await?;

            if let Some(usage) = &response.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Token usage"
                );
            }

            let choice = response.choices.into_iter().next().ok_or_else(|| {
                LlmError::UnexpectedResponse("No choices in response".to_string())
            })?;
            let message = choice.message;

            match message.tool_calls.as_deref() {
                Some(calls) if !calls.is_empty() => {
                    info!(iteration, count = calls.len(), "Model requested tool calls");
                    let results = Self::run_tool_calls(&spec.tools, calls).await?;
                    messages.push(message);
                    messages.extend(results);
                }
                _ => {
                    info!(iteration, "Model returned final answer");
                    return Ok(message.content.unwrap_or_default());
                }
            }
        }

        warn!(max_iterations = settings.max_iterations, "Max iterations reached");
        Err(LlmError::MaxIterations(settings.max_iterations))
    }
}

fn convert_tools(tools: &[Arc<dyn Tool>]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|tool| WireTool {
            tool_type: "function".to_string(),
            function: WireFunction {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.input_schema(),
            },
        })
        .collect()
}

/// Tool arguments arrive as a JSON string; an empty string means no arguments
fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|e| LlmError::UnexpectedResponse(format!("Invalid tool arguments: {e}")))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn system(content: String) -> Self {
        Self::text("system", content)
    }

    fn user(content: String) -> Self {
        Self::text("user", content)
    }

    fn tool(tool_call_id: String, content: String) -> Self {
        Self {
            tool_call_id: Some(tool_call_id),
            ..Self::text("tool", content)
        }
    }

    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    tool_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
}
