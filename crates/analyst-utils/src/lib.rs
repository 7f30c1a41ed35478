//! Shared utilities for analyst-graph
//!
//! This crate provides logging setup and the application configuration
//! (analyst selection, locale, model and tool-service settings) read once
//! at process startup.

pub mod config;
pub mod logging;

pub use config::{AppConfig, LoadError, ModelSettings, ToolServiceSettings};
pub use logging::{init_tracing, init_tracing_with_default};
