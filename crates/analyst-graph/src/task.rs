//! Task trait and dispatch table

use analyst_core::{NodeId, ResultRecord, TaskError};
use async_trait::async_trait;
use std::sync::Arc;

/// The unit of work behind one node
///
/// A task reads the record and returns the text for its node's output
/// field. The executor wraps that text into the node's patch, so a task has
/// no way to write any other field.
#[async_trait]
pub trait AnalystTask: Send + Sync {
    /// Node this task implements
    fn node(&self) -> NodeId;

    /// Compute the output for [`node`](Self::node)
    ///
    /// Fan-out tasks see only the identifying fields. The risk task sees
    /// every analyst output of the run, the portfolio task additionally the
    /// risk output. Absent fields are legal.
    async fn run(&self, record: &ResultRecord) -> Result<String, TaskError>;
}

/// One task per node
///
/// Construction goes through every [`NodeId`], so a table can never miss a
/// node.
#[derive(Clone)]
pub struct TaskTable {
    news: Arc<dyn AnalystTask>,
    technical: Arc<dyn AnalystTask>,
    fundamentals: Arc<dyn AnalystTask>,
    growth: Arc<dyn AnalystTask>,
    valuation: Arc<dyn AnalystTask>,
    risk: Arc<dyn AnalystTask>,
    portfolio: Arc<dyn AnalystTask>,
}

impl TaskTable {
    /// Build a table by asking `make` for each node's task
    pub fn from_fn(mut make: impl FnMut(NodeId) -> Arc<dyn AnalystTask>) -> Self {
        Self {
            news: make(NodeId::News),
            technical: make(NodeId::Technical),
            fundamentals: make(NodeId::Fundamentals),
            growth: make(NodeId::Growth),
            valuation: make(NodeId::Valuation),
            risk: make(NodeId::Risk),
            portfolio: make(NodeId::Portfolio),
        }
    }

    /// Replace the task of `task.node()`
    pub fn with(mut self, task: Arc<dyn AnalystTask>) -> Self {
        let id = task.node();
        *self.slot_mut(id) = task;
        self
    }

    pub fn get(&self, id: NodeId) -> &Arc<dyn AnalystTask> {
        match id {
            NodeId::News => &self.news,
            NodeId::Technical => &self.technical,
            NodeId::Fundamentals => &self.fundamentals,
            NodeId::Growth => &self.growth,
            NodeId::Valuation => &self.valuation,
            NodeId::Risk => &self.risk,
            NodeId::Portfolio => &self.portfolio,
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Arc<dyn AnalystTask> {
        match id {
            NodeId::News => &mut self.news,
            NodeId::Technical => &mut self.technical,
            NodeId::Fundamentals => &mut self.fundamentals,
            NodeId::Growth => &mut self.growth,
            NodeId::Valuation => &mut self.valuation,
            NodeId::Risk => &mut self.risk,
            NodeId::Portfolio => &mut self.portfolio,
        }
    }
}
