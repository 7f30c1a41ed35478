//! Model runner layer for analyst-graph
//!
//! This crate provides:
//!
//! - [`AgentRunner`]: runs one instruction with a system prompt and tools
//! - [`OpenAiRunner`]: tool-calling loop over an OpenAI-compatible API
//! - [`LlmError`]: failure kinds, convertible into a task failure

pub mod error;
pub mod openai;
pub mod runner;

// Re-export main types
pub use error::{LlmError, Result};
pub use openai::OpenAiRunner;
pub use runner::{AgentRunner, RunnerSpec};
