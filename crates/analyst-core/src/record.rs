//! Result record and update patches
//!
//! The [`ResultRecord`] is the state threaded through one pipeline run. Its
//! identifying fields are fixed at construction; every output field is
//! optional and may be written at most once, by the node that owns it.
//! Tasks never touch the record directly: they produce an [`UpdatePatch`]
//! which the executor folds in with [`ResultRecord::apply`].

use crate::error::{GraphError, Result};
use crate::node::NodeId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output fields of the record, one per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputField {
    NewsAnalysis,
    TechnicalAnalysis,
    FundamentalsAnalysis,
    GrowthAnalysis,
    ValuationAnalysis,
    RiskAnalysis,
    PortfolioRecommendation,
}

impl OutputField {
    /// Serialized key of this field
    pub fn key(self) -> &'static str {
        match self {
            OutputField::NewsAnalysis => "news_analysis_result",
            OutputField::TechnicalAnalysis => "technical_analysis_result",
            OutputField::FundamentalsAnalysis => "fundamentals_analysis_result",
            OutputField::GrowthAnalysis => "growth_analysis_result",
            OutputField::ValuationAnalysis => "valuation_analysis_result",
            OutputField::RiskAnalysis => "risk_analysis_result",
            OutputField::PortfolioRecommendation => "portfolio_recommendation",
        }
    }
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Identifying fields supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Security code, e.g. `AAPL` or `600519.SH`
    #[serde(rename = "stock_code")]
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Subject {
    pub fn new(code: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            code: code.into(),
            start_date,
            end_date,
        }
    }

    /// Check the date range and code before a run starts
    pub fn validate(&self) -> std::result::Result<(), crate::ConfigError> {
        if self.code.trim().is_empty() {
            return Err(crate::ConfigError::Invalid(
                "stock code must not be empty".to_string(),
            ));
        }
        if self.start_date > self.end_date {
            return Err(crate::ConfigError::Invalid(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

/// Evolving analysis state for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(flatten)]
    subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    news_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    technical_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fundamentals_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    growth_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    valuation_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    risk_analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    portfolio_recommendation: Option<String>,
}

impl ResultRecord {
    /// Create a record with only the identifying fields set
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            news_analysis_result: None,
            technical_analysis_result: None,
            fundamentals_analysis_result: None,
            growth_analysis_result: None,
            valuation_analysis_result: None,
            risk_analysis_result: None,
            portfolio_recommendation: None,
        }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Read an output field; `None` means not computed in this run
    pub fn get(&self, field: OutputField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Output field owned by `node`
    pub fn output_of(&self, node: NodeId) -> Option<&str> {
        self.get(node.field())
    }

    /// Output fields currently set, in catalogue order
    pub fn present_fields(&self) -> Vec<OutputField> {
        NodeId::ALL
            .iter()
            .map(|id| id.field())
            .filter(|field| self.get(*field).is_some())
            .collect()
    }

    /// Apply a patch in place
    ///
    /// Fails if the patch's field was already written, which would mean two
    /// writers for one field.
    pub fn apply(&mut self, patch: UpdatePatch) -> Result<()> {
        let field = patch.field();
        let slot = self.slot_mut(field);
        if slot.is_some() {
            return Err(GraphError::Aggregation(format!(
                "field '{field}' written twice (by {})",
                patch.node
            )));
        }
        *slot = Some(patch.value);
        Ok(())
    }

    fn slot(&self, field: OutputField) -> &Option<String> {
        match field {
            OutputField::NewsAnalysis => &self.news_analysis_result,
            OutputField::TechnicalAnalysis => &self.technical_analysis_result,
            OutputField::FundamentalsAnalysis => &self.fundamentals_analysis_result,
            OutputField::GrowthAnalysis => &self.growth_analysis_result,
            OutputField::ValuationAnalysis => &self.valuation_analysis_result,
            OutputField::RiskAnalysis => &self.risk_analysis_result,
            OutputField::PortfolioRecommendation => &self.portfolio_recommendation,
        }
    }

    fn slot_mut(&mut self, field: OutputField) -> &mut Option<String> {
        match field {
            OutputField::NewsAnalysis => &mut self.news_analysis_result,
            OutputField::TechnicalAnalysis => &mut self.technical_analysis_result,
            OutputField::FundamentalsAnalysis => &mut self.fundamentals_analysis_result,
            OutputField::GrowthAnalysis => &mut self.growth_analysis_result,
            OutputField::ValuationAnalysis => &mut self.valuation_analysis_result,
            OutputField::RiskAnalysis => &mut self.risk_analysis_result,
            OutputField::PortfolioRecommendation => &mut self.portfolio_recommendation,
        }
    }
}

/// Merge a patch into a record, returning the updated record
pub fn merge(mut record: ResultRecord, patch: UpdatePatch) -> Result<ResultRecord> {
    record.apply(patch)?;
    Ok(record)
}

/// One node's contribution to the record
///
/// The target field is derived from the node, so a patch can only ever
/// address the field its node owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePatch {
    node: NodeId,
    value: String,
}

impl UpdatePatch {
    pub fn new(node: NodeId, value: impl Into<String>) -> Self {
        Self {
            node,
            value: value.into(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn field(&self) -> OutputField {
        self.node.field()
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}
