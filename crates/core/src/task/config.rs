//! Configuration for the task runner.

use serde::{Deserialize, Serialize};

/// Configuration for external transformation processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Transformation program used by the built-in catalog.
    #[serde(default = "default_program")]
    pub program: String,

    /// Timeout for a single transformation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Capture process output and forward it to the log instead of
    /// inheriting the worker's stdout/stderr.
    #[serde(default)]
    pub capture_output: bool,
}

fn default_program() -> String {
    "ffmpeg".to_string()
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            timeout_secs: default_timeout(),
            capture_output: false,
        }
    }
}

impl RunnerConfig {
    /// Sets the transformation program.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Enables output capture.
    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}
