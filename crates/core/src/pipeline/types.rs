//! Types for the pipeline orchestrator.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::config::Config;
use crate::store::RemoteHeaders;
use crate::task::{TaskDescriptor, TransformProfile};
use crate::transfer::{DownloadRequest, InputArtifact, UploadReceipt};

use super::error::PipelineError;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Downloading,
    /// Input is local and descriptors are being prepared.
    Ready,
    /// Sequential mode: task `index` is running.
    Transforming { index: usize, task: String },
    /// Sequential mode: task `index` output is being uploaded.
    Uploading { index: usize, task: String },
    /// Concurrent mode: `total` tasks are scheduled.
    Running { total: usize },
    Completed,
    Failed,
}

impl PipelineState {
    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Downloading => write!(f, "downloading"),
            Self::Ready => write!(f, "ready"),
            Self::Transforming { index, task } => write!(f, "transforming({}:{})", index, task),
            Self::Uploading { index, task } => write!(f, "uploading({}:{})", index, task),
            Self::Running { total } => write!(f, "running({} tasks)", total),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Stage at which a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPhase {
    Transform,
    Upload,
}

/// Final status of one task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Artifact produced and stored.
    Uploaded {
        bytes: u64,
        sha256: String,
        headers: RemoteHeaders,
    },
    Failed { phase: FailedPhase, error: String },
    /// Never started because an earlier task failed.
    Skipped,
}

/// Outcome of one task, reported in catalog order.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub name: String,
    pub output_local_path: PathBuf,
    pub destination_container: String,
    pub destination_key: String,
    pub content_type: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    /// Wall time spent transforming and uploading.
    pub duration_ms: u64,
}

impl TaskOutcome {
    fn from_task(task: &TaskDescriptor, status: TaskStatus, duration_ms: u64) -> Self {
        Self {
            name: task.name.clone(),
            output_local_path: task.output_local_path.clone(),
            destination_container: task.destination_container.clone(),
            destination_key: task.destination_key.clone(),
            content_type: task.content_type.clone(),
            status,
            duration_ms,
        }
    }

    pub fn uploaded(task: &TaskDescriptor, receipt: UploadReceipt, duration_ms: u64) -> Self {
        Self::from_task(
            task,
            TaskStatus::Uploaded {
                bytes: receipt.size_bytes,
                sha256: receipt.sha256,
                headers: receipt.headers,
            },
            duration_ms,
        )
    }

    pub fn failed(
        task: &TaskDescriptor,
        phase: FailedPhase,
        error: impl fmt::Display,
        duration_ms: u64,
    ) -> Self {
        Self::from_task(
            task,
            TaskStatus::Failed {
                phase,
                error: error.to_string(),
            },
            duration_ms,
        )
    }

    pub fn skipped(task: &TaskDescriptor) -> Self {
        Self::from_task(task, TaskStatus::Skipped, 0)
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self.status, TaskStatus::Uploaded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TaskStatus::Skipped)
    }
}

/// What a pipeline run operates on.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    /// Container holding the input object.
    pub input_container: String,
    /// Key of the input object.
    pub input_key: String,
    /// Default destination for artifacts.
    pub output_container: String,
    /// Base directory for the scratch directory.
    pub local_prefix: PathBuf,
    /// Scratch directory name prefix.
    pub scratch_prefix: String,
    /// Profiles applied to the input, in order.
    pub catalog: Vec<TransformProfile>,
}

impl PipelineJob {
    pub fn new(
        input_container: impl Into<String>,
        input_key: impl Into<String>,
        output_container: impl Into<String>,
        local_prefix: impl Into<PathBuf>,
        catalog: Vec<TransformProfile>,
    ) -> Self {
        Self {
            input_container: input_container.into(),
            input_key: input_key.into(),
            output_container: output_container.into(),
            local_prefix: local_prefix.into(),
            scratch_prefix: "tmp-".to_string(),
            catalog,
        }
    }

    /// Builds the job described by a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_container: config.storage.input_container.clone(),
            input_key: config.storage.input_key.clone(),
            output_container: config.storage.output_container.clone(),
            local_prefix: config.storage.local_prefix.clone(),
            scratch_prefix: config.storage.scratch_prefix.clone(),
            catalog: config.catalog(),
        }
    }

    pub fn with_scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    pub fn download_request(&self) -> DownloadRequest {
        DownloadRequest::new(&self.input_container, &self.input_key, &self.local_prefix)
            .with_scratch_prefix(&self.scratch_prefix)
    }
}

/// Aggregated result of a run that got past download and task setup.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub input: InputArtifact,
    /// `Completed` or `Failed`.
    pub state: PipelineState,
    pub outcomes: Vec<TaskOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The failure that decided the run, if any.
    #[serde(serialize_with = "serialize_error")]
    pub first_error: Option<PipelineError>,
}

fn serialize_error<S>(error: &Option<PipelineError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl PipelineReport {
    /// Whether every task uploaded its artifact.
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Completed
    }

    pub fn uploaded(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_uploaded()).collect()
    }

    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed()).collect()
    }

    pub fn skipped(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped()).collect()
    }

    /// Outcome of the task with the given name.
    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::CommandSpec;

    fn task() -> TaskDescriptor {
        TaskDescriptor {
            name: "mp4".to_string(),
            command: CommandSpec::new("ffmpeg", vec![]),
            input_local_path: PathBuf::from("/w/movie.mov"),
            output_local_path: PathBuf::from("/w/movie.mp4"),
            destination_container: "video_output".to_string(),
            destination_key: "movie.mp4".to_string(),
            content_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(PipelineState::Transforming {
            index: 1,
            task: "mp4".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "transforming");
        assert_eq!(json["index"], 1);

        assert_eq!(
            PipelineState::Uploading {
                index: 0,
                task: "webm".into()
            }
            .to_string(),
            "uploading(0:webm)"
        );
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Ready.is_terminal());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = TaskOutcome::failed(&task(), FailedPhase::Transform, "exit 1", 12);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["name"], "mp4");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["phase"], "transform");
        assert_eq!(json["error"], "exit 1");
        assert!(outcome.is_failed());
        assert!(!TaskOutcome::skipped(&task()).is_failed());
    }

    #[test]
    fn test_download_request_from_job() {
        let job = PipelineJob::new("in", "movie.mov", "out", "/go/video", vec![])
            .with_scratch_prefix("scratch-");
        let request = job.download_request();
        assert_eq!(
            request.local_path().unwrap(),
            PathBuf::from("/go/video/scratch-movie.mov/movie.mov")
        );
    }

    #[test]
    fn test_job_from_default_config() {
        let job = PipelineJob::from_config(&Config::default());
        assert_eq!(job.input_container, "video_input");
        assert_eq!(job.input_key, "movie.mov");
        assert_eq!(job.output_container, "video_output");
        assert_eq!(job.local_prefix, PathBuf::from("/go/video"));
        assert_eq!(job.catalog.len(), 3);
    }
}
