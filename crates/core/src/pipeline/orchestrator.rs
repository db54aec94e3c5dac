//! Pipeline orchestrator: download, fan out, upload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::store::ObjectStore;
use crate::task::{build_descriptors, TaskDescriptor, TaskRunner};
use crate::transfer::{download, upload_file, InputArtifact, TransferConfig};

use super::config::{ExecutionMode, PipelineConfig};
use super::error::PipelineError;
use super::types::{FailedPhase, PipelineJob, PipelineReport, PipelineState, TaskOutcome};

/// Runs one job: downloads the input, executes every task and uploads
/// each artifact.
pub struct Pipeline<S: ObjectStore + ?Sized, R: TaskRunner + ?Sized> {
    job: PipelineJob,
    config: PipelineConfig,
    transfer: TransferConfig,
    store: Arc<S>,
    runner: Arc<R>,
    state: Arc<RwLock<PipelineState>>,
}

/// Everything a single task needs, shareable with spawned units.
struct TaskContext<S: ?Sized, R: ?Sized> {
    store: Arc<S>,
    runner: Arc<R>,
    transfer: TransferConfig,
}

impl<S: ?Sized, R: ?Sized> Clone for TaskContext<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            runner: Arc::clone(&self.runner),
            transfer: self.transfer.clone(),
        }
    }
}

impl<S, R> Pipeline<S, R>
where
    S: ObjectStore + ?Sized + 'static,
    R: TaskRunner + ?Sized + 'static,
{
    /// Creates a pipeline with default scheduling and transfer settings.
    pub fn new(job: PipelineJob, store: Arc<S>, runner: Arc<R>) -> Self {
        Self {
            job,
            config: PipelineConfig::default(),
            transfer: TransferConfig::default(),
            store,
            runner,
            state: Arc::new(RwLock::new(PipelineState::Idle)),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn job(&self) -> &PipelineJob {
        &self.job
    }

    /// Returns the current state.
    pub async fn state(&self) -> PipelineState {
        self.state.read().await.clone()
    }

    /// Runs the job to completion.
    ///
    /// Returns `Err` only when nothing could be scheduled: the input
    /// download failed or the catalog produced no valid descriptors.
    /// Task failures are reported through the returned report.
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<PipelineReport, PipelineError> {
        let started_at = Utc::now();
        info!(
            container = %self.job.input_container,
            key = %self.job.input_key,
            tasks = self.job.catalog.len(),
            mode = ?self.config.mode,
            "Starting pipeline run"
        );

        set_state(&self.state, PipelineState::Downloading).await;
        let request = self.job.download_request();
        let input = match download(&*self.store, &request, &self.transfer).await {
            Ok(input) => input,
            Err(e) => {
                error!(error = %e, "Input download failed");
                set_state(&self.state, PipelineState::Failed).await;
                return Err(PipelineError::Download(e));
            }
        };

        set_state(&self.state, PipelineState::Ready).await;
        let descriptors =
            match build_descriptors(&input, &self.job.catalog, &self.job.output_container) {
                Ok(descriptors) => descriptors,
                Err(e) => {
                    error!(error = %e, "Failed to build task descriptors");
                    set_state(&self.state, PipelineState::Failed).await;
                    self.cleanup(&input).await;
                    return Err(PipelineError::Descriptors(e));
                }
            };

        let (outcomes, first_error) = match self.config.mode {
            ExecutionMode::Sequential => self.run_sequential(&descriptors).await,
            ExecutionMode::Concurrent => self.run_concurrent(&descriptors).await,
        };

        self.cleanup(&input).await;

        let state = if first_error.is_none() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        };
        set_state(&self.state, state.clone()).await;

        let report = PipelineReport {
            run_id,
            input,
            state,
            outcomes,
            started_at,
            finished_at: Utc::now(),
            first_error,
        };

        info!(
            uploaded = report.uploaded().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            duration_ms = report.duration_ms(),
            "Pipeline run finished"
        );

        Ok(report)
    }

    fn context(&self) -> TaskContext<S, R> {
        TaskContext {
            store: Arc::clone(&self.store),
            runner: Arc::clone(&self.runner),
            transfer: self.transfer.clone(),
        }
    }

    /// Runs tasks one after another in catalog order.
    async fn run_sequential(
        &self,
        descriptors: &[TaskDescriptor],
    ) -> (Vec<TaskOutcome>, Option<PipelineError>) {
        let context = self.context();
        let mut outcomes = Vec::with_capacity(descriptors.len());
        let mut first_error = None;

        for (index, task) in descriptors.iter().enumerate() {
            if first_error.is_some() && !self.config.continue_on_error {
                info!(task = %task.name, "Skipping task after earlier failure");
                outcomes.push(TaskOutcome::skipped(task));
                continue;
            }

            let (outcome, err) = context.execute(index, task, Some(&*self.state)).await;
            outcomes.push(outcome);
            if let Some(err) = err {
                first_error.get_or_insert(err);
            }
        }

        (outcomes, first_error)
    }

    /// Runs tasks in parallel, bounded by `max_parallel_tasks`.
    ///
    /// After the first failure no new task starts unless
    /// `continue_on_error` is set. Tasks already running finish normally.
    async fn run_concurrent(
        &self,
        descriptors: &[TaskDescriptor],
    ) -> (Vec<TaskOutcome>, Option<PipelineError>) {
        set_state(
            &self.state,
            PipelineState::Running {
                total: descriptors.len(),
            },
        )
        .await;

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tasks.max(1)));
        let abort = Arc::new(AtomicBool::new(false));
        let first_error: Arc<Mutex<Option<PipelineError>>> = Arc::new(Mutex::new(None));
        let continue_on_error = self.config.continue_on_error;

        let mut units = JoinSet::new();
        for (index, task) in descriptors.iter().cloned().enumerate() {
            let context = self.context();
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let first_error = Arc::clone(&first_error);

            units.spawn(
                async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return (index, TaskOutcome::skipped(&task)),
                    };
                    if abort.load(Ordering::SeqCst) {
                        info!(task = %task.name, "Skipping task after earlier failure");
                        return (index, TaskOutcome::skipped(&task));
                    }

                    let (outcome, err) = context.execute(index, &task, None).await;
                    if let Some(err) = err {
                        if !continue_on_error {
                            abort.store(true, Ordering::SeqCst);
                        }
                        first_error.lock().await.get_or_insert(err);
                    }
                    (index, outcome)
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<TaskOutcome>> = vec![None; descriptors.len()];
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "Task unit did not complete"),
            }
        }

        let mut first_error = first_error.lock().await.take();
        let outcomes: Vec<TaskOutcome> = slots
            .into_iter()
            .zip(descriptors)
            .map(|(slot, task)| {
                slot.unwrap_or_else(|| {
                    let reason = "unit panicked or was cancelled";
                    first_error.get_or_insert_with(|| PipelineError::Aborted {
                        name: task.name.clone(),
                        reason: reason.to_string(),
                    });
                    TaskOutcome::failed(task, FailedPhase::Transform, reason, 0)
                })
            })
            .collect();

        (outcomes, first_error)
    }

    /// Removes the scratch directory when cleanup is enabled.
    async fn cleanup(&self, input: &InputArtifact) {
        if !self.config.cleanup {
            return;
        }
        let dir = input.work_dir();
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!(path = %dir.display(), "Removed scratch directory"),
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
}

impl<S, R> TaskContext<S, R>
where
    S: ObjectStore + ?Sized,
    R: TaskRunner + ?Sized,
{
    /// Transforms then uploads one task. State transitions are recorded
    /// only when `state` is given (sequential mode).
    async fn execute(
        &self,
        index: usize,
        task: &TaskDescriptor,
        state: Option<&RwLock<PipelineState>>,
    ) -> (TaskOutcome, Option<PipelineError>) {
        let start = Instant::now();

        if let Some(state) = state {
            set_state(
                state,
                PipelineState::Transforming {
                    index,
                    task: task.name.clone(),
                },
            )
            .await;
        }

        if let Err(e) = self.runner.run(task).await {
            let elapsed = start.elapsed().as_millis() as u64;
            error!(task = %task.name, error = %e, "Transformation failed");
            let outcome = TaskOutcome::failed(task, FailedPhase::Transform, &e, elapsed);
            return (
                outcome,
                Some(PipelineError::Task {
                    name: task.name.clone(),
                    source: e,
                }),
            );
        }

        if let Some(state) = state {
            set_state(
                state,
                PipelineState::Uploading {
                    index,
                    task: task.name.clone(),
                },
            )
            .await;
        }

        let result = upload_file(
            &*self.store,
            &task.content_type,
            &task.destination_container,
            &task.destination_key,
            &task.output_local_path,
            &self.transfer,
        )
        .await;
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(receipt) => {
                info!(
                    task = %task.name,
                    container = %receipt.container,
                    key = %receipt.key,
                    bytes = receipt.size_bytes,
                    duration_ms = elapsed,
                    "Artifact uploaded"
                );
                (TaskOutcome::uploaded(task, receipt, elapsed), None)
            }
            Err(e) => {
                error!(task = %task.name, error = %e, "Artifact upload failed");
                let outcome = TaskOutcome::failed(task, FailedPhase::Upload, &e, elapsed);
                (
                    outcome,
                    Some(PipelineError::Upload {
                        name: task.name.clone(),
                        source: e,
                    }),
                )
            }
        }
    }
}

async fn set_state(state: &RwLock<PipelineState>, next: PipelineState) {
    let mut current = state.write().await;
    info!(from = %*current, to = %next, "Pipeline state changed");
    *current = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::default_catalog;
    use crate::testing::{MockObjectStore, MockTaskRunner};
    use crate::transfer::RetryPolicy;
    use tempfile::TempDir;

    fn pipeline(
        temp: &TempDir,
        store: &MockObjectStore,
        runner: &MockTaskRunner,
    ) -> Pipeline<MockObjectStore, MockTaskRunner> {
        let job = PipelineJob::new(
            "video_input",
            "movie.mov",
            "video_output",
            temp.path(),
            default_catalog(),
        );
        Pipeline::new(job, Arc::new(store.clone()), Arc::new(runner.clone()))
            .with_transfer(TransferConfig::default().with_retry(RetryPolicy::none()))
    }

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(&temp, &MockObjectStore::new(), &MockTaskRunner::new());
        assert_eq!(pipeline.state().await, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_sequential_run_completes() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        store
            .put_object("video_input", "movie.mov", b"raw".to_vec())
            .await;
        let runner = MockTaskRunner::new();

        let pipeline = pipeline(&temp, &store, &runner);
        let report = pipeline.run().await.unwrap();

        assert!(report.succeeded());
        assert_eq!(pipeline.state().await, PipelineState::Completed);
        assert_eq!(report.uploaded().len(), 3);
        assert_eq!(runner.invocations().await, vec!["webm", "mp4", "jpg"]);
        assert_eq!(runner.max_observed_concurrency().await, 1);
    }

    #[tokio::test]
    async fn test_download_failure_is_err() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        let runner = MockTaskRunner::new();

        let pipeline = pipeline(&temp, &store, &runner);
        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Download(_))));
        assert_eq!(pipeline.state().await, PipelineState::Failed);
        assert!(runner.invocations().await.is_empty());
    }

    #[tokio::test]
    async fn test_descriptor_failure_is_err() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        store
            .put_object("video_input", "movie.mov", b"raw".to_vec())
            .await;
        let runner = MockTaskRunner::new();
        let job = PipelineJob::new("video_input", "movie.mov", "video_output", temp.path(), vec![]);

        let pipeline = Pipeline::new(job, Arc::new(store), Arc::new(runner.clone()));
        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Descriptors(_))));
        assert!(runner.invocations().await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_scratch_dir() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        store
            .put_object("video_input", "movie.mov", b"raw".to_vec())
            .await;
        let runner = MockTaskRunner::new();

        let report = pipeline(&temp, &store, &runner)
            .with_config(PipelineConfig::default().with_cleanup(true))
            .run()
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(!temp.path().join("tmp-movie.mov").exists());
    }

    #[tokio::test]
    async fn test_scratch_dir_kept_by_default() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();
        store
            .put_object("video_input", "movie.mov", b"raw".to_vec())
            .await;
        let runner = MockTaskRunner::new();

        pipeline(&temp, &store, &runner).run().await.unwrap();

        let dir = temp.path().join("tmp-movie.mov");
        assert!(dir.join("movie.mov").exists());
        assert!(dir.join("movie.webm").exists());
    }
}
