//! Run and task state machines
//!
//! ```text
//! workflow: Init → FanOut → Barrier → RiskStage → PortfolioStage → Done
//!                  └──────────┴──────────┴────────────┴──→ Aborted
//! task:     Pending → Running → Completed | Failed | Cancelled
//! ```

use analyst_core::{GraphError, NodeId, Result};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Progress of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Init,
    FanOut,
    Barrier,
    RiskStage,
    PortfolioStage,
    Done,
    Aborted,
}

impl WorkflowState {
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::{Aborted, Barrier, Done, FanOut, Init, PortfolioStage, RiskStage};
        matches!(
            (self, next),
            (Init, FanOut)
                | (FanOut, Barrier)
                | (Barrier, RiskStage)
                | (RiskStage, PortfolioStage)
                | (PortfolioStage, Done)
                | (FanOut | Barrier | RiskStage | PortfolioStage, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Aborted)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "init",
            WorkflowState::FanOut => "fan_out",
            WorkflowState::Barrier => "barrier",
            WorkflowState::RiskStage => "risk_stage",
            WorkflowState::PortfolioStage => "portfolio_stage",
            WorkflowState::Done => "done",
            WorkflowState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Progress of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Cancelled, Completed, Failed, Pending, Running};
        matches!(
            (self, next),
            (Pending, Running | Cancelled) | (Running, Completed | Failed | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// State of a run and of each of its tasks
///
/// Every transition is checked; an illegal one means the executor itself is
/// broken and surfaces as an aggregation error.
#[derive(Debug, Clone)]
pub struct RunTracker {
    workflow: WorkflowState,
    tasks: BTreeMap<NodeId, TaskState>,
}

impl RunTracker {
    /// Start tracking `nodes`, all pending
    pub fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            workflow: WorkflowState::Init,
            tasks: nodes.into_iter().map(|id| (id, TaskState::Pending)).collect(),
        }
    }

    pub fn workflow(&self) -> WorkflowState {
        self.workflow
    }

    pub fn task(&self, id: NodeId) -> Option<TaskState> {
        self.tasks.get(&id).copied()
    }

    /// Nodes currently in `state`
    pub fn tasks_in(&self, state: TaskState) -> Vec<NodeId> {
        self.tasks
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn advance(&mut self, next: WorkflowState) -> Result<()> {
        if !self.workflow.can_transition_to(next) {
            return Err(GraphError::Aggregation(format!(
                "illegal workflow transition {} -> {next}",
                self.workflow
            )));
        }
        debug!(from = %self.workflow, to = %next, "workflow_transition");
        self.workflow = next;
        Ok(())
    }

    pub fn set_task(&mut self, id: NodeId, next: TaskState) -> Result<()> {
        let current = self.tasks.get(&id).copied().ok_or_else(|| {
            GraphError::Aggregation(format!("node '{id}' is not part of this run"))
        })?;
        if !current.can_transition_to(next) {
            return Err(GraphError::Aggregation(format!(
                "illegal task transition for '{id}': {current:?} -> {next:?}"
            )));
        }
        debug!(node = %id, from = ?current, to = ?next, "task_transition");
        self.tasks.insert(id, next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_happy_path() {
        let mut tracker = RunTracker::new([NodeId::News, NodeId::Risk]);
        for next in [
            WorkflowState::FanOut,
            WorkflowState::Barrier,
            WorkflowState::RiskStage,
            WorkflowState::PortfolioStage,
            WorkflowState::Done,
        ] {
            tracker.advance(next).unwrap();
        }
        assert!(tracker.workflow().is_terminal());
    }

    #[test]
    fn test_workflow_rejects_skipping_barrier() {
        let mut tracker = RunTracker::new([]);
        tracker.advance(WorkflowState::FanOut).unwrap();
        assert!(tracker.advance(WorkflowState::RiskStage).is_err());
        assert_eq!(tracker.workflow(), WorkflowState::FanOut);
    }

    #[test]
    fn test_abort_only_after_fan_out_begins() {
        assert!(!WorkflowState::Init.can_transition_to(WorkflowState::Aborted));
        assert!(WorkflowState::FanOut.can_transition_to(WorkflowState::Aborted));
        assert!(WorkflowState::PortfolioStage.can_transition_to(WorkflowState::Aborted));
        assert!(!WorkflowState::Done.can_transition_to(WorkflowState::Aborted));
    }

    #[test]
    fn test_task_transitions() {
        let mut tracker = RunTracker::new([NodeId::Growth]);
        tracker.set_task(NodeId::Growth, TaskState::Running).unwrap();
        tracker.set_task(NodeId::Growth, TaskState::Completed).unwrap();

        assert!(tracker.set_task(NodeId::Growth, TaskState::Failed).is_err());
        assert!(tracker.set_task(NodeId::News, TaskState::Running).is_err());
        assert_eq!(tracker.task(NodeId::Growth), Some(TaskState::Completed));
        assert_eq!(tracker.tasks_in(TaskState::Completed), vec![NodeId::Growth]);
    }
}
