pub mod config;
pub mod pipeline;
pub mod store;
pub mod task;
pub mod testing;
pub mod transfer;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, SanitizedConfig, StoreBackend,
};
pub use pipeline::{
    ExecutionMode, Pipeline, PipelineConfig, PipelineError, PipelineJob, PipelineReport,
    PipelineState, TaskOutcome, TaskStatus,
};
pub use store::{FsStore, ObjectStore, RemoteHeaders, StoreError, SwiftStore};
pub use task::{
    build_descriptors, default_catalog, ProcessRunner, TaskDescriptor, TaskError, TaskRunner,
    TransformProfile,
};
pub use transfer::{download, upload, upload_file, InputArtifact, TransferConfig, TransferError};
