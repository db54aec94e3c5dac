//! Fan-out pipeline orchestrator.
//!
//! A run downloads one input object, builds a task per catalog profile,
//! executes each task and uploads its artifact:
//!
//! ```text
//! Idle -> Downloading -> Ready -> Transforming(i) -> Uploading(i) -> ... -> Completed
//!                                                                      \-> Failed
//! ```
//!
//! Tasks run sequentially by default, or concurrently on a bounded worker
//! group. The first failure stops new tasks from starting unless
//! `continue_on_error` is enabled. Every task gets an outcome in the
//! [`PipelineReport`], in catalog order.

mod config;
mod error;
mod orchestrator;
mod types;

pub use config::{ExecutionMode, PipelineConfig};
pub use error::PipelineError;
pub use orchestrator::Pipeline;
pub use types::{
    FailedPhase, PipelineJob, PipelineReport, PipelineState, TaskOutcome, TaskStatus,
};
