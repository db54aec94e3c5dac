//! Transformation tasks.
//!
//! A catalog of [`TransformProfile`]s describes the artifacts derived from
//! one input. For a downloaded input the catalog is expanded into
//! [`TaskDescriptor`]s with concrete local paths and destinations, which a
//! [`TaskRunner`] then executes.
//!
//! The built-in catalog produces:
//! - WebM rendition (`video/webm`)
//! - MP4 rendition (`video/mp4`)
//! - JPEG thumbnail (`image/jpg`)

mod config;
mod descriptor;
mod error;
mod profile;
mod runner;

pub use config::RunnerConfig;
pub use descriptor::{artifact_stem, build_descriptors, CommandSpec, TaskDescriptor};
pub use error::TaskError;
pub use profile::{default_catalog, TransformProfile, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
pub use runner::{ProcessRunner, TaskRunner};
