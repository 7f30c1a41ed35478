//! Prompt templates for analyst-graph
//!
//! Every pipeline node has a system prompt written as a Jinja2 template and
//! embedded in the binary. Templates are rendered with the current date and
//! the configured locale.
//!
//! # Quick Start
//!
//! ```
//! use analyst_core::NodeId;
//! use analyst_prompt::{PromptProvider, TemplatePromptProvider};
//! use chrono::NaiveDate;
//!
//! let prompts = TemplatePromptProvider::new("en-US")
//!     .with_date(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
//!
//! let prompt = prompts.render(NodeId::News).unwrap();
//! assert!(prompt.contains("2025-06-30"));
//! assert!(prompt.contains("English"));
//! ```

mod error;
mod language;
mod provider;

pub use error::{PromptError, Result};
pub use language::Language;
pub use provider::{PromptProvider, TemplatePromptProvider};
