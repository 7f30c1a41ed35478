//! Analysis pipeline construction and execution
//!
//! A pipeline runs a configurable set of analyst tasks concurrently, joins
//! at a barrier, then runs the risk and portfolio tasks in sequence:
//!
//! ```text
//! start ─┬─ news_analyst ─────────┬─ barrier → risk_manager → portfolio_manager → end
//!        ├─ technical_analyst ────┤
//!        └─ ...                  ─┘
//! ```
//!
//! - [`build`] compiles a [`CompiledGraph`] from the selected analysts
//! - [`Executor`] runs it against a [`TaskTable`]
//! - [`AnalysisPipeline`] ties both together behind `invoke(subject)`
//! - [`LlmTask`] is the model-backed task used in production

pub mod builder;
pub mod executor;
pub mod llm_task;
pub mod pipeline;
pub mod state;
pub mod task;

// Re-export for convenience
pub use builder::{CompiledGraph, Edge, Vertex, build};
pub use executor::Executor;
pub use llm_task::{LlmTask, TaskServices, analysis_summary, instruction};
pub use pipeline::AnalysisPipeline;
pub use state::{RunTracker, TaskState, WorkflowState};
pub use task::{AnalystTask, TaskTable};
