//! Mock task runner for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::task::{TaskDescriptor, TaskError, TaskRunner};

/// Mock implementation of the TaskRunner trait.
///
/// Instead of launching a process, a successful run writes
/// `"<task name>\n"` followed by the input bytes to the output path.
///
/// Provides controllable behavior for testing:
/// - Fail named tasks with an exit code
/// - Succeed without producing output
/// - Delay tasks to exercise concurrency
/// - Record invocation order and peak parallelism
#[derive(Debug, Clone)]
pub struct MockTaskRunner {
    invocations: Arc<RwLock<Vec<String>>>,
    failures: Arc<RwLock<HashMap<String, Option<i32>>>>,
    missing_outputs: Arc<RwLock<HashSet<String>>>,
    delays: Arc<RwLock<HashMap<String, Duration>>>,
    default_delay: Arc<RwLock<Duration>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRunner {
    /// Create a runner where every task succeeds immediately.
    pub fn new() -> Self {
        Self {
            invocations: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            missing_outputs: Arc::new(RwLock::new(HashSet::new())),
            delays: Arc::new(RwLock::new(HashMap::new())),
            default_delay: Arc::new(RwLock::new(Duration::ZERO)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the named task exit with `code` (`None` simulates a signal).
    pub async fn fail_task(&self, name: &str, code: Option<i32>) {
        self.failures.write().await.insert(name.to_string(), code);
    }

    /// Make the named task exit 0 without writing its output.
    pub async fn skip_output(&self, name: &str) {
        self.missing_outputs.write().await.insert(name.to_string());
    }

    /// Delay the named task.
    pub async fn set_delay(&self, name: &str, delay: Duration) {
        self.delays.write().await.insert(name.to_string(), delay);
    }

    /// Delay every task without a specific delay.
    pub async fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.write().await = delay;
    }

    /// Names of the tasks that started, in start order.
    pub async fn invocations(&self) -> Vec<String> {
        self.invocations.read().await.clone()
    }

    /// Highest number of tasks observed running at once.
    pub async fn max_observed_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, task: &TaskDescriptor) -> Result<(), TaskError> {
        let input = tokio::fs::read(&task.input_local_path)
            .await
            .map_err(|_| TaskError::InputMissing {
                path: task.input_local_path.clone(),
            })?;

        self.invocations.write().await.push(task.name.clone());

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = match self.delays.read().await.get(&task.name) {
            Some(delay) => *delay,
            None => *self.default_delay.read().await,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(code) = self.failures.read().await.get(&task.name) {
            return Err(TaskError::ExitStatus {
                name: task.name.clone(),
                code: *code,
            });
        }

        if self.missing_outputs.read().await.contains(&task.name) {
            return Ok(());
        }

        let mut output = format!("{}\n", task.name).into_bytes();
        output.extend_from_slice(&input);
        tokio::fs::write(&task.output_local_path, output)
            .await
            .map_err(|e| TaskError::Io {
                name: task.name.clone(),
                source: e,
            })
    }
}
