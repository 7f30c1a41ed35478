//! Model-backed tasks
//!
//! [`LlmTask`] is the production [`AnalystTask`]: it resolves its node's
//! tools from the shared catalog, renders the node's system prompt and hands
//! an instruction built from the record to the agent runner.

use crate::task::{AnalystTask, TaskTable};
use analyst_core::{NodeId, OutputField, ResultRecord, TaskError};
use analyst_llm::{AgentRunner, RunnerSpec};
use analyst_mcp::ToolCatalog;
use analyst_prompt::PromptProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collaborators shared by every task of a pipeline
#[derive(Clone)]
pub struct TaskServices {
    pub runner: Arc<dyn AgentRunner>,
    pub catalog: Arc<dyn ToolCatalog>,
    pub prompts: Arc<dyn PromptProvider>,
}

impl TaskServices {
    pub fn new(
        runner: Arc<dyn AgentRunner>,
        catalog: Arc<dyn ToolCatalog>,
        prompts: Arc<dyn PromptProvider>,
    ) -> Self {
        Self {
            runner,
            catalog,
            prompts,
        }
    }
}

/// Task that answers through a model runner
pub struct LlmTask {
    node: NodeId,
    services: TaskServices,
}

impl LlmTask {
    pub fn new(node: NodeId, services: TaskServices) -> Self {
        Self { node, services }
    }

    /// A table with an [`LlmTask`] for every node
    pub fn table(services: &TaskServices) -> TaskTable {
        TaskTable::from_fn(|id| Arc::new(LlmTask::new(id, services.clone())))
    }
}

#[async_trait]
impl AnalystTask for LlmTask {
    fn node(&self) -> NodeId {
        self.node
    }

    async fn run(&self, record: &ResultRecord) -> Result<String, TaskError> {
        let capability = self.node.descriptor().capability;

        let tools = self.services.catalog.tools_for(capability.tools).await?;
        if tools.len() < capability.tools.len() {
            warn!(
                node = %self.node,
                declared = capability.tools.len(),
                found = tools.len(),
                "Some declared tools are not offered by the tool service"
            );
        }

        let system_prompt = self.services.prompts.render(self.node)?;
        let spec = RunnerSpec::new(capability.role, system_prompt).with_tools(tools);
        let instruction = instruction(self.node, record);
        debug!(node = %self.node, tools = ?spec.tool_names(), "Invoking runner");

        Ok(self.services.runner.invoke(&spec, &instruction).await?)
    }
}

/// Instruction text sent to the model for `node`
pub fn instruction(node: NodeId, record: &ResultRecord) -> String {
    let subject = record.subject();
    let code = &subject.code;
    let window = format!("from {} to {}", subject.start_date, subject.end_date);

    match node {
        NodeId::News => format!(
            "please do a comprehensive news sentiment analysis for {code} {window}."
        ),
        NodeId::Technical => format!(
            "please do a comprehensive technical analysis for stock {code}, including price trends, technical indicators, and money flow patterns {window}."
        ),
        NodeId::Fundamentals => format!(
            "please do a comprehensive fundamental analysis for stock {code}, including financial statements, key metrics, and macroeconomic context {window}."
        ),
        NodeId::Growth => format!(
            "please do a comprehensive growth analysis for stock {code}, including revenue/profit trends, market expansion, and institutional interest {window}."
        ),
        NodeId::Valuation => format!(
            "please do a comprehensive valuation analysis for stock {code}, including P/E, P/B, P/S ratios, peer comparison, and fair value assessment {window}."
        ),
        NodeId::Risk => format!(
            "please do a comprehensive risk analysis for stock {code}, including margin trading, block trades, debt levels, and other risk factors {window}."
        ),
        NodeId::Portfolio => format!(
            "Based on the following comprehensive analyses, provide a final investment recommendation:\n\n{}",
            analysis_summary(record)
        ),
    }
}

const SUMMARY_SECTIONS: [(OutputField, &str); 6] = [
    (OutputField::NewsAnalysis, "News Analysis"),
    (OutputField::TechnicalAnalysis, "Technical Analysis"),
    (OutputField::FundamentalsAnalysis, "Fundamental Analysis"),
    (OutputField::GrowthAnalysis, "Growth Analysis"),
    (OutputField::ValuationAnalysis, "Valuation Analysis"),
    (OutputField::RiskAnalysis, "Risk Analysis"),
];

/// Subject header followed by every present analysis section
pub fn analysis_summary(record: &ResultRecord) -> String {
    let subject = record.subject();
    let mut parts = vec![format!(
        "Stock: {}\nFrom {} to {}\n",
        subject.code, subject.start_date, subject.end_date
    )];
    for (field, title) in SUMMARY_SECTIONS {
        if let Some(text) = record.get(field) {
            parts.push(format!("{title}:\n{text}\n"));
        }
    }
    parts.join("\n")
}
