//! Pipeline executor
//!
//! The executor walks a [`CompiledGraph`]:
//! 1. Spawn every active analyst task on the runtime
//! 2. Merge each patch into the record as its task finishes
//! 3. At the barrier, run the risk task and then the portfolio task
//!
//! The record is owned by the executor for the whole run and is only
//! written from the join loop, so patches never apply concurrently even
//! though tasks compute concurrently.
//!
//! The first failing task aborts the run. Its siblings are signalled
//! through a cancellation token and detached; whatever they produce
//! afterwards is dropped.

use crate::builder::CompiledGraph;
use crate::state::{RunTracker, TaskState, WorkflowState};
use crate::task::{AnalystTask, TaskTable};
use analyst_core::{GraphError, NodeId, Result, ResultRecord, TaskError, UpdatePatch};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// What a spawned task hands back; `None` means it observed cancellation
type TaskOutcome = Option<std::result::Result<String, TaskError>>;

/// Runs compiled graphs against a task table
#[derive(Clone)]
pub struct Executor {
    tasks: Arc<TaskTable>,
}

impl Executor {
    pub fn new(tasks: TaskTable) -> Self {
        Self {
            tasks: Arc::new(tasks),
        }
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    /// Run `graph` from `initial` to the final record
    pub async fn run(&self, graph: &CompiledGraph, initial: ResultRecord) -> Result<ResultRecord> {
        self.run_with_cancellation(graph, initial, CancellationToken::new())
            .await
    }

    /// Run `graph`, stopping with [`GraphError::Cancelled`] once `cancel` fires
    ///
    /// A graph that fails [`CompiledGraph::validate`] is rejected before any
    /// task starts.
    #[instrument(
        name = "pipeline_run",
        skip_all,
        fields(stock_code = %initial.subject().code, analysts = graph.active().len())
    )]
    pub async fn run_with_cancellation(
        &self,
        graph: &CompiledGraph,
        initial: ResultRecord,
        cancel: CancellationToken,
    ) -> Result<ResultRecord> {
        graph.validate()?;

        let mut tracker = RunTracker::new(
            graph
                .active()
                .ids()
                .chain([NodeId::Risk, NodeId::Portfolio]),
        );
        let mut record = initial;

        info!(
            start_date = %record.subject().start_date,
            end_date = %record.subject().end_date,
            "workflow_started"
        );

        let outcome = self
            .run_stages(graph, &mut record, &mut tracker, &cancel)
            .await;

        match outcome {
            Ok(()) => {
                tracker.advance(WorkflowState::Done)?;
                info!(fields = record.present_fields().len(), "workflow_completed");
                Ok(record)
            }
            Err(err) => {
                if !tracker.workflow().is_terminal() && tracker.workflow() != WorkflowState::Init {
                    tracker.advance(WorkflowState::Aborted)?;
                }
                error!(
                    failed_node = err.failed_node().map(NodeId::name),
                    error = %err,
                    "workflow_aborted"
                );
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        graph: &CompiledGraph,
        record: &mut ResultRecord,
        tracker: &mut RunTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracker.advance(WorkflowState::FanOut)?;
        self.fan_out(graph, record, tracker, cancel).await?;

        tracker.advance(WorkflowState::Barrier)?;
        info!(merged = record.present_fields().len(), "barrier_reached");

        tracker.advance(WorkflowState::RiskStage)?;
        self.run_sequential(NodeId::Risk, record, tracker, cancel)
            .await?;

        tracker.advance(WorkflowState::PortfolioStage)?;
        self.run_sequential(NodeId::Portfolio, record, tracker, cancel)
            .await
    }

    /// Run the active analysts concurrently and merge their patches
    async fn fan_out(
        &self,
        graph: &CompiledGraph,
        record: &mut ResultRecord,
        tracker: &mut RunTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if graph.active().is_empty() {
            return Ok(());
        }

        // Cancelling siblings must not look like the caller cancelling
        let siblings = cancel.child_token();
        let view = Arc::new(record.clone());
        let mut set = JoinSet::new();
        let mut spawned = HashMap::new();

        for id in graph.active().ids() {
            let handle = set.spawn(guarded(
                Arc::clone(self.tasks.get(id)),
                Arc::clone(&view),
                siblings.clone(),
            ));
            spawned.insert(handle.id(), id);
            tracker.set_task(id, TaskState::Running)?;
            info!(node = %id, "task_started");
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(err) => (err.id(), Some(Err(join_failure(&err)))),
            };
            let Some(id) = spawned.get(&task_id).copied() else {
                continue;
            };

            let result = match outcome {
                Some(Ok(text)) => {
                    tracker.set_task(id, TaskState::Completed)?;
                    info!(node = %id, "task_completed");
                    record.apply(UpdatePatch::new(id, text))
                }
                Some(Err(cause)) => {
                    tracker.set_task(id, TaskState::Failed)?;
                    warn!(node = %id, category = cause.category(), error = %cause, "task_failed");
                    Err(GraphError::node(id, cause))
                }
                None => {
                    tracker.set_task(id, TaskState::Cancelled)?;
                    info!(node = %id, "task_cancelled");
                    Err(GraphError::Cancelled)
                }
            };

            if let Err(err) = result {
                siblings.cancel();
                set.detach_all();
                for pending in tracker.tasks_in(TaskState::Running) {
                    tracker.set_task(pending, TaskState::Cancelled)?;
                    info!(node = %pending, "task_cancelled");
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// Run one tail task against the merged record and merge its patch
    async fn run_sequential(
        &self,
        id: NodeId,
        record: &mut ResultRecord,
        tracker: &mut RunTracker,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracker.set_task(id, TaskState::Running)?;
        info!(node = %id, "task_started");

        let handle = tokio::spawn(guarded(
            Arc::clone(self.tasks.get(id)),
            Arc::new(record.clone()),
            cancel.clone(),
        ));
        let outcome = handle
            .await
            .unwrap_or_else(|err| Some(Err(join_failure(&err))));

        match outcome {
            Some(Ok(text)) => {
                tracker.set_task(id, TaskState::Completed)?;
                info!(node = %id, "task_completed");
                record.apply(UpdatePatch::new(id, text))
            }
            Some(Err(cause)) => {
                tracker.set_task(id, TaskState::Failed)?;
                warn!(node = %id, category = cause.category(), error = %cause, "task_failed");
                Err(GraphError::node(id, cause))
            }
            None => {
                tracker.set_task(id, TaskState::Cancelled)?;
                info!(node = %id, "task_cancelled");
                Err(GraphError::Cancelled)
            }
        }
    }
}

/// Run a task until it finishes or `cancel` fires, whichever comes first
async fn guarded(
    task: Arc<dyn AnalystTask>,
    view: Arc<ResultRecord>,
    cancel: CancellationToken,
) -> TaskOutcome {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = task.run(&view) => Some(result),
    }
}

fn join_failure(err: &JoinError) -> TaskError {
    if err.is_panic() {
        TaskError::Internal("task panicked".to_string())
    } else {
        TaskError::Internal(format!("task aborted: {err}"))
    }
}
