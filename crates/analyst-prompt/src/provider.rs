//! System prompt rendering
//!
//! [`TemplatePromptProvider`] holds one Jinja2 template per node name. The
//! built-in templates can be replaced with [`TemplatePromptProvider::register`].

use crate::{Language, PromptError, Result};
use analyst_core::NodeId;
use chrono::NaiveDate;
use minijinja::{Environment, context};
use std::collections::HashMap;

/// Produces the system prompt for a node
pub trait PromptProvider: Send + Sync {
    /// Render the system prompt for `node`
    fn render(&self, node: NodeId) -> Result<String>;
}

const BUILTIN_TEMPLATES: [(&str, &str); 7] = [
    ("news_analyst", include_str!("../templates/news_analyst.j2")),
    ("technical_analyst", include_str!("../templates/technical_analyst.j2")),
    ("fundamentals_analyst", include_str!("../templates/fundamentals_analyst.j2")),
    ("growth_analyst", include_str!("../templates/growth_analyst.j2")),
    ("valuation_analyst", include_str!("../templates/valuation_analyst.j2")),
    ("risk_manager", include_str!("../templates/risk_manager.j2")),
    ("portfolio_manager", include_str!("../templates/portfolio_manager.j2")),
];

/// Prompt provider backed by MiniJinja templates
///
/// Template variables:
/// - `current_date`: `YYYY-MM-DD`, today unless fixed with [`with_date`](Self::with_date)
/// - `locale`: the configured locale tag
/// - `language`: display name of the locale's language
#[derive(Debug, Clone)]
pub struct TemplatePromptProvider {
    templates: HashMap<String, String>,
    locale: String,
    date: Option<NaiveDate>,
}

impl TemplatePromptProvider {
    /// Create a provider with the built-in templates
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            templates: BUILTIN_TEMPLATES
                .iter()
                .map(|(name, source)| ((*name).to_string(), (*source).to_string()))
                .collect(),
            locale: locale.into(),
            date: None,
        }
    }

    /// Render with a fixed date instead of today
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Register or replace the template for a node name
    pub fn register(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Render a template by name
    pub fn render_named(&self, name: &str) -> Result<String> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| PromptError::TemplateNotRegistered(name.to_string()))?;

        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        let current_date = self
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();
        let language = Language::from_locale(&self.locale);

        env.render_str(
            source,
            context! {
                current_date => current_date,
                locale => self.locale.as_str(),
                language => language.name(),
            },
        )
        .map(|rendered| rendered.trim_end().to_string())
        .map_err(|e| PromptError::RenderError {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }
}

impl PromptProvider for TemplatePromptProvider {
    fn render(&self, node: NodeId) -> Result<String> {
        self.render_named(node.name())
    }
}
