use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;
use crate::task::{default_catalog, RunnerConfig, TransformProfile};
use crate::transfer::TransferConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Replaces the built-in catalog when set.
    #[serde(default)]
    pub profiles: Option<Vec<TransformProfile>>,
}

impl Config {
    /// Effective transformation catalog.
    ///
    /// Configured profiles are used as given. Otherwise the built-in
    /// catalog runs with `runner.program` as its executable.
    pub fn catalog(&self) -> Vec<TransformProfile> {
        match &self.profiles {
            Some(profiles) => profiles.clone(),
            None => default_catalog()
                .into_iter()
                .map(|p| p.with_program(self.runner.program.clone()))
                .collect(),
        }
    }
}

/// Input object and local layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_input_container")]
    pub input_container: String,
    #[serde(default = "default_output_container")]
    pub output_container: String,
    #[serde(default = "default_input_key")]
    pub input_key: String,
    /// Base directory for scratch space
    #[serde(default = "default_local_prefix")]
    pub local_prefix: PathBuf,
    #[serde(default = "default_scratch_prefix")]
    pub scratch_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_container: default_input_container(),
            output_container: default_output_container(),
            input_key: default_input_key(),
            local_prefix: default_local_prefix(),
            scratch_prefix: default_scratch_prefix(),
        }
    }
}

fn default_input_container() -> String {
    "video_input".to_string()
}

fn default_output_container() -> String {
    "video_output".to_string()
}

fn default_input_key() -> String {
    "movie.mov".to_string()
}

fn default_local_prefix() -> PathBuf {
    PathBuf::from("/go/video")
}

fn default_scratch_prefix() -> String {
    "tmp-".to_string()
}

/// Object store configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Swift-specific configuration (required when backend = "swift")
    #[serde(default)]
    pub swift: Option<SwiftConfig>,
    /// Local directory configuration (required when backend = "fs")
    #[serde(default)]
    pub fs: Option<FsStoreConfig>,
}

/// Available object store backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Swift,
    Fs,
}

/// Swift (Cloud Files) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwiftConfig {
    /// Account storage URL (e.g., "https://storage101.dfw1.clouddrive.com/v1/MossoCloudFS_...")
    pub storage_url: String,
    /// Token sent as X-Auth-Token
    pub auth_token: String,
    /// Request timeout in seconds (default: 3600)
    #[serde(default = "default_swift_timeout")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_swift_timeout() -> u64 {
    3600
}

fn default_connect_timeout() -> u64 {
    30
}

/// Local directory store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FsStoreConfig {
    /// Directory holding one subdirectory per container
    pub root: PathBuf,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub storage: StorageConfig,
    pub store: SanitizedStoreConfig,
    pub runner: RunnerConfig,
    pub pipeline: PipelineConfig,
    pub transfer: TransferConfig,
    /// Names of the effective catalog profiles
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStoreConfig {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swift: Option<SanitizedSwiftConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsStoreConfig>,
}

/// Sanitized Swift config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSwiftConfig {
    pub storage_url: String,
    pub auth_token_configured: bool,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            storage: config.storage.clone(),
            store: SanitizedStoreConfig {
                backend: match config.store.backend {
                    StoreBackend::Swift => "swift".to_string(),
                    StoreBackend::Fs => "fs".to_string(),
                },
                swift: config.store.swift.as_ref().map(|s| SanitizedSwiftConfig {
                    storage_url: s.storage_url.clone(),
                    auth_token_configured: !s.auth_token.is_empty(),
                    timeout_secs: s.timeout_secs,
                    connect_timeout_secs: s.connect_timeout_secs,
                }),
                fs: config.store.fs.clone(),
            },
            runner: config.runner.clone(),
            pipeline: config.pipeline.clone(),
            transfer: config.transfer.clone(),
            profiles: config.catalog().into_iter().map(|p| p.name).collect(),
        }
    }
}
