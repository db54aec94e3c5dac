//! Testing utilities and mock implementations.
//!
//! Mocks for the object store and task runner traits, so a full pipeline
//! run can be exercised without a remote store or ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidfan_core::testing::{MockObjectStore, MockTaskRunner};
//!
//! let store = MockObjectStore::new();
//! store.put_object("video_input", "movie.mov", b"raw".to_vec()).await;
//!
//! let runner = MockTaskRunner::new();
//! runner.fail_task("mp4", Some(1)).await;
//!
//! // Build a Pipeline with Arc::new(store.clone()), Arc::new(runner.clone())...
//! ```

mod mock_object_store;
mod mock_task_runner;

pub use mock_object_store::{MockObjectStore, RecordedUpload};
pub use mock_task_runner::MockTaskRunner;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::pipeline::PipelineJob;
    use crate::task::default_catalog;
    use std::path::Path;

    /// Deterministic pseudo-video payload of `len` bytes.
    pub fn video_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// The default job: `video_input/movie.mov` to `video_output` under `prefix`.
    pub fn movie_job(prefix: &Path) -> PipelineJob {
        PipelineJob::new(
            "video_input",
            "movie.mov",
            "video_output",
            prefix,
            default_catalog(),
        )
    }
}
