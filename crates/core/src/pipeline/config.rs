//! Configuration for the pipeline orchestrator.

use serde::{Deserialize, Serialize};

/// How transformation tasks are scheduled once the input is local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One task at a time, in catalog order.
    #[default]
    Sequential,
    /// Tasks run in parallel, bounded by `max_parallel_tasks`.
    Concurrent,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Task scheduling mode.
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Maximum tasks in flight in concurrent mode.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Keep running the remaining tasks after one fails.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Remove the scratch directory after the run.
    #[serde(default)]
    pub cleanup: bool,
}

fn default_max_parallel_tasks() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            max_parallel_tasks: default_max_parallel_tasks(),
            continue_on_error: false,
            cleanup: false,
        }
    }
}

impl PipelineConfig {
    /// Sets the scheduling mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Switches to concurrent mode with the given bound.
    pub fn concurrent(mut self, max_parallel_tasks: usize) -> Self {
        self.mode = ExecutionMode::Concurrent;
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.max_parallel_tasks, 3);
        assert!(!config.continue_on_error);
        assert!(!config.cleanup);
    }

    #[test]
    fn test_deserialize_mode() {
        let config: PipelineConfig = toml::from_str(
            r#"
mode = "concurrent"
max_parallel_tasks = 2
"#,
        )
        .unwrap();
        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert_eq!(config.max_parallel_tasks, 2);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::default()
            .concurrent(4)
            .with_continue_on_error(true)
            .with_cleanup(true);
        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert_eq!(config.max_parallel_tasks, 4);
        assert!(config.continue_on_error);
        assert!(config.cleanup);
    }
}
