//! Top-level entry point

use crate::builder::{CompiledGraph, build};
use crate::executor::Executor;
use crate::task::TaskTable;
use analyst_core::{ActiveSet, Result, ResultRecord, Subject, resolve};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A compiled pipeline ready to analyse subjects
///
/// # Example
///
/// ```no_run
/// use analyst_graph::{AnalysisPipeline, LlmTask, TaskServices};
/// use analyst_core::Subject;
/// use chrono::NaiveDate;
///
/// # async fn example(services: TaskServices) -> analyst_core::Result<()> {
/// let pipeline = AnalysisPipeline::new(Some(["news", "technical"].as_slice()), LlmTask::table(&services))?;
///
/// let subject = Subject::new(
///     "600519.SH",
///     NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
/// );
/// let record = pipeline.invoke(subject).await?;
/// println!("{}", serde_json::to_string_pretty(&record).unwrap());
/// # Ok(())
/// # }
/// ```
pub struct AnalysisPipeline {
    graph: CompiledGraph,
    executor: Executor,
}

impl AnalysisPipeline {
    /// Resolve `selection` and compile the graph
    ///
    /// `None` selects every analyst. Unknown or duplicate names fail here,
    /// before any task runs.
    pub fn new<S: AsRef<str>>(selection: Option<&[S]>, tasks: TaskTable) -> Result<Self> {
        Self::from_active(&resolve(selection)?, tasks)
    }

    /// Compile the graph for an already resolved analyst set
    pub fn from_active(active: &ActiveSet, tasks: TaskTable) -> Result<Self> {
        let graph = build(active);
        graph.validate()?;
        info!(
            analysts = ?active.ids().map(|id| id.name()).collect::<Vec<_>>(),
            "Pipeline compiled"
        );
        Ok(Self {
            graph,
            executor: Executor::new(tasks),
        })
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Analyse `subject` and return the completed record
    pub async fn invoke(&self, subject: Subject) -> Result<ResultRecord> {
        self.invoke_with_cancellation(subject, CancellationToken::new())
            .await
    }

    /// Like [`invoke`](Self::invoke), stopping early once `cancel` fires
    pub async fn invoke_with_cancellation(
        &self,
        subject: Subject,
        cancel: CancellationToken,
    ) -> Result<ResultRecord> {
        subject.validate()?;
        self.executor
            .run_with_cancellation(&self.graph, ResultRecord::new(subject), cancel)
            .await
    }
}
