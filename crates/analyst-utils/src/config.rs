//! Configuration management utilities
//!
//! Configuration is read once at startup from an optional YAML file
//! (`conf.yaml` in the working directory unless a path is given) and then
//! overlaid with environment variables.
//!
//! ```yaml
//! SELECTED_ANALYSTS: [news, technical]
//! locale: en-US
//! models:
//!   basic:
//!     model: gpt-4o-mini
//!     api_base: https://api.openai.com/v1
//! tool_service:
//!   sse_url: http://localhost:3101/sse
//!   streamable_http_url: http://localhost:3100/mcp
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "conf.yaml";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration file could not be read
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for [`AppConfig`]
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Analysts to run; absent selects every analyst
    #[serde(rename = "SELECTED_ANALYSTS", alias = "selected_analysts")]
    pub selected_analysts: Option<Vec<String>>,

    /// Locale passed to prompt templates (e.g. `zh-CN`)
    pub locale: String,

    /// Model settings keyed by role (`basic`, `reasoning`, `vision`)
    pub models: HashMap<String, ModelSettings>,

    /// Remote tool service endpoints
    pub tool_service: ToolServiceSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            selected_analysts: None,
            locale: "zh-CN".to_string(),
            models: HashMap::new(),
            tool_service: ToolServiceSettings::default(),
        }
    }
}

/// Settings for one model role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model name sent to the API
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    pub api_base: String,

    /// API key; when absent it is read from `api_key_env`
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum model round-trips per task (tool calls included)
    pub max_iterations: usize,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_iterations: 10,
            temperature: None,
        }
    }
}

impl ModelSettings {
    /// The configured key, or the value of `api_key_env`
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
    }
}

/// Remote tool service settings
///
/// The transport actually used is chosen at startup from the presence of
/// the `token_env` variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServiceSettings {
    /// Endpoint of the event-stream transport
    pub sse_url: String,

    /// Endpoint of the streamable HTTP transport
    pub streamable_http_url: String,

    /// Environment variable holding the access token
    pub token_env: String,

    /// Header the token is sent in
    pub token_header: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ToolServiceSettings {
    fn default() -> Self {
        Self {
            sse_url: "http://localhost:3101/sse".to_string(),
            streamable_http_url: "http://localhost:3100/mcp".to_string(),
            token_env: "TUSHARE_TOKEN".to_string(),
            token_header: "X-Tushare-Token".to_string(),
            timeout_secs: 600,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Load the effective configuration
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// used if present, and defaults otherwise. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables (`LOCALE`)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(locale) = std::env::var("LOCALE") {
            if !locale.trim().is_empty() {
                self.locale = locale;
            }
        }
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), LoadError> {
        for (role, settings) in &self.models {
            if settings.max_iterations == 0 {
                return Err(LoadError::Invalid(format!(
                    "models.{role}.max_iterations must be greater than 0"
                )));
            }
            if settings.timeout_secs == 0 {
                return Err(LoadError::Invalid(format!(
                    "models.{role}.timeout_secs must be greater than 0"
                )));
            }
        }
        if self.tool_service.timeout_secs == 0 {
            return Err(LoadError::Invalid(
                "tool_service.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Analyst selection to resolve; an absent or empty list selects all
    pub fn analyst_selection(&self) -> Option<&[String]> {
        self.selected_analysts
            .as_deref()
            .filter(|names| !names.is_empty())
    }

    /// Settings for a model role, falling back to `basic` and then defaults
    pub fn model(&self, role: &str) -> ModelSettings {
        self.models
            .get(role)
            .or_else(|| self.models.get("basic"))
            .cloned()
            .unwrap_or_default()
    }
}
