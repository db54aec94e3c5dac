//! Error types for the pipeline orchestrator.

use thiserror::Error;

use crate::task::TaskError;
use crate::transfer::TransferError;

/// Errors that stop or fail a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input could not be downloaded; no task ran.
    #[error("Input download failed: {0}")]
    Download(#[source] TransferError),

    /// Descriptors could not be built; no task ran.
    #[error("Invalid task catalog: {0}")]
    Descriptors(#[source] TaskError),

    /// A transformation failed.
    #[error("Task {name} failed: {source}")]
    Task {
        name: String,
        #[source]
        source: TaskError,
    },

    /// An artifact could not be uploaded.
    #[error("Upload of task {name} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: TransferError,
    },

    /// A concurrent unit panicked or was cancelled.
    #[error("Task {name} did not complete: {reason}")]
    Aborted { name: String, reason: String },
}

impl PipelineError {
    /// Name of the task the error belongs to, if any.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::Task { name, .. } | Self::Upload { name, .. } | Self::Aborted { name, .. } => {
                Some(name)
            }
            Self::Download(_) | Self::Descriptors(_) => None,
        }
    }
}
