//! Transport configuration for the remote tool service
//!
//! The tool service is reachable over one of two transports. Which one is
//! used is decided once at startup by [`TransportConfig::from_env`] and the
//! resulting value is passed to the client explicitly.

use analyst_utils::ToolServiceSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Transport to the remote tool service
///
/// # Example
///
/// ```json
/// { "transport": "streamable_http", "url": "http://localhost:3100/mcp",
///   "headers": { "X-Tushare-Token": "..." }, "timeout_secs": 600 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Streamable HTTP transport, replies may be JSON or event-stream framed
    StreamableHttp {
        /// Server URL
        url: String,

        /// HTTP headers sent with every request
        #[serde(default)]
        headers: HashMap<String, String>,

        /// Timeout in seconds
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },

    /// SSE (Server-Sent Events) transport
    Sse {
        /// Server URL
        url: String,

        /// Timeout in seconds
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

fn default_timeout() -> u64 {
    600
}

impl TransportConfig {
    /// Pick the transport for the given access token
    ///
    /// A token selects the streamable HTTP endpoint and is sent in the
    /// configured header; without one the SSE endpoint is used.
    pub fn select(settings: &ToolServiceSettings, token: Option<String>) -> Self {
        match token {
            Some(token) => TransportConfig::StreamableHttp {
                url: settings.streamable_http_url.clone(),
                headers: HashMap::from([(settings.token_header.clone(), token)]),
                timeout_secs: settings.timeout_secs,
            },
            None => TransportConfig::Sse {
                url: settings.sse_url.clone(),
                timeout_secs: settings.timeout_secs,
            },
        }
    }

    /// Pick the transport from the token environment variable
    pub fn from_env(settings: &ToolServiceSettings) -> Self {
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty());
        Self::select(settings, token)
    }

    pub fn url(&self) -> &str {
        match self {
            TransportConfig::StreamableHttp { url, .. } | TransportConfig::Sse { url, .. } => url,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            TransportConfig::StreamableHttp { timeout_secs, .. }
            | TransportConfig::Sse { timeout_secs, .. } => Duration::from_secs(*timeout_secs),
        }
    }

    /// Extra headers sent with every request
    pub fn headers(&self) -> Option<&HashMap<String, String>> {
        match self {
            TransportConfig::StreamableHttp { headers, .. } => Some(headers),
            TransportConfig::Sse { .. } => None,
        }
    }

    /// Transport name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::StreamableHttp { .. } => "streamable_http",
            TransportConfig::Sse { .. } => "sse",
        }
    }
}
