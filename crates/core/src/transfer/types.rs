//! Types for the transfer layer.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::store::RemoteHeaders;

use super::error::TransferError;

/// The downloaded input object, materialized on local disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputArtifact {
    /// Container the object was read from.
    pub container: String,
    /// Object key.
    pub key: String,
    /// Local copy of the object.
    pub local_path: PathBuf,
    /// Bytes written to `local_path`.
    pub size_bytes: u64,
    /// Download response headers.
    pub headers: RemoteHeaders,
}

impl InputArtifact {
    /// Directory holding the input and every derived artifact.
    pub fn work_dir(&self) -> &Path {
        self.local_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Where and how to download the pipeline input.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub container: String,
    pub key: String,
    /// Base directory for per-object scratch directories.
    pub local_prefix: PathBuf,
    /// Marker prepended to the key to name the scratch directory.
    pub scratch_prefix: String,
}

impl DownloadRequest {
    pub fn new(
        container: impl Into<String>,
        key: impl Into<String>,
        local_prefix: impl Into<PathBuf>,
    ) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            local_prefix: local_prefix.into(),
            scratch_prefix: "tmp-".to_string(),
        }
    }

    pub fn with_scratch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scratch_prefix = prefix.into();
        self
    }

    /// Scratch directory scoped to this object: `<local_prefix>/<scratch_prefix><key>`.
    pub fn scratch_dir(&self) -> Result<PathBuf, TransferError> {
        self.validate_key()?;
        Ok(self
            .local_prefix
            .join(format!("{}{}", self.scratch_prefix, self.key)))
    }

    /// Local path of the downloaded object inside the scratch directory.
    pub fn local_path(&self) -> Result<PathBuf, TransferError> {
        let file_name = Path::new(&self.key)
            .file_name()
            .ok_or_else(|| TransferError::InvalidKey {
                key: self.key.clone(),
            })?;
        Ok(self.scratch_dir()?.join(file_name))
    }

    fn validate_key(&self) -> Result<(), TransferError> {
        let path = Path::new(&self.key);
        let valid = !self.key.is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));
        if valid {
            Ok(())
        } else {
            Err(TransferError::InvalidKey {
                key: self.key.clone(),
            })
        }
    }
}

/// Result of a file upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub container: String,
    pub key: String,
    pub content_type: String,
    /// Bytes streamed to the store.
    pub size_bytes: u64,
    /// SHA-256 of the uploaded file (hex).
    pub sha256: String,
    /// Upload response headers.
    pub headers: RemoteHeaders,
}

/// Size and digests of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size_bytes: u64,
    pub sha256: String,
    pub md5: String,
}
