//! Core types for analyst-graph
//!
//! This crate defines the data the pipeline threads through its stages:
//! the node catalogue, the result record with its update patches, the tool
//! capability handed to runners, and the error kinds a run can produce.

pub mod error;
pub mod node;
pub mod record;
pub mod tool;

pub use error::{ConfigError, GraphError, Result, TaskError};
pub use node::{resolve, ActiveSet, Capability, ModelRole, NodeDescriptor, NodeId, Stage};
pub use record::{merge, OutputField, ResultRecord, Subject, UpdatePatch};
pub use tool::{select_tools, Tool};
