//! Remote tool service integration for analyst-graph
//!
//! Nodes reach market data through tools served over the Model Context
//! Protocol. This crate provides:
//! - [`TransportConfig`]: streamable HTTP or SSE, chosen once at startup
//! - [`McpHttpClient`]: JSON-RPC 2.0 over HTTP, replies read from the
//!   response body (streamable HTTP) or from the server's event stream (SSE)
//! - [`ToolCatalog`]: lists tools and filters them per node
//!
//! # Example
//!
//! ```no_run
//! use analyst_mcp::{McpToolCatalog, ToolCatalog, TransportConfig};
//! use analyst_utils::ToolServiceSettings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TransportConfig::from_env(&ToolServiceSettings::default());
//! let catalog = McpToolCatalog::new(transport)?;
//!
//! let tools = catalog.tools_for(&["get_stock_news"]).await?;
//! println!("Found {} tools", tools.len());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
mod sse;
pub mod tool;

// Re-export commonly used types
pub use catalog::{McpToolCatalog, StaticToolCatalog, ToolCatalog};
pub use client::{McpHttpClient, ServerInfo, ToolCallResult, ToolContent, ToolDefinition};
pub use config::TransportConfig;
pub use error::McpError;
pub use tool::McpTool;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;
