//! Error types for the task module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or running transformation tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The catalog has no profiles.
    #[error("Transformation catalog is empty")]
    EmptyCatalog,

    /// A profile or template names no executable.
    #[error("Task {name} has an empty command")]
    EmptyCommand { name: String },

    /// Two tasks would write the same local file.
    #[error("Task {name} output collides with another task: {path}")]
    DuplicateOutput { name: String, path: PathBuf },

    /// A task would overwrite the input it reads.
    #[error("Task {name} output would overwrite the input: {path}")]
    OutputOverwritesInput { name: String, path: PathBuf },

    /// The input file is not present locally.
    #[error("Input file not found: {path}")]
    InputMissing { path: PathBuf },

    /// The process could not be started.
    #[error("Failed to launch {program} for task {name}: {source}")]
    LaunchFailed {
        name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a nonzero status.
    #[error("Task {name} exited with status {}", describe_code(.code))]
    ExitStatus { name: String, code: Option<i32> },

    /// The process exceeded its time budget and was killed.
    #[error("Task {name} timed out after {timeout_secs} seconds")]
    Timeout { name: String, timeout_secs: u64 },

    /// Waiting on the process failed.
    #[error("I/O error while running task {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl TaskError {
    /// Whether the error came from executing the external process.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed { .. } | Self::ExitStatus { .. } | Self::Timeout { .. } | Self::Io { .. }
        )
    }
}
