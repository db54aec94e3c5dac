//! Error types for the transfer layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while moving bytes between the store and local disk.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The remote object could not be opened or its stream broke.
    #[error("Failed to read {container}/{key} from the remote store: {source}")]
    RemoteRead {
        container: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The remote stream ended before the declared content length.
    #[error(
        "Remote object {container}/{key} length mismatch: declared {declared} bytes, received {received}"
    )]
    LengthMismatch {
        container: String,
        key: String,
        declared: u64,
        received: u64,
    },

    /// The remote object streamed zero bytes.
    #[error("Remote object {container}/{key} is empty")]
    EmptyObject { container: String, key: String },

    /// The store rejected or failed the upload.
    #[error("Failed to write {container}/{key} to the remote store: {source}")]
    RemoteWrite {
        container: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// Response headers could not be extracted.
    #[error("Failed to extract response headers for {container}/{key}: {source}")]
    HeaderExtraction {
        container: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The local file or directory could not be created or written.
    #[error("Failed to write local file {path}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local file to upload could not be opened or read.
    #[error("Failed to read local file {path}: {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local reader feeding an upload failed.
    #[error("Failed to read local data for {container}/{key}: {source}")]
    LocalStream {
        container: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The object key cannot be mapped to a local path.
    #[error("Object key cannot be stored locally: {key}")]
    InvalidKey { key: String },
}

impl TransferError {
    /// Classifies a store error raised while downloading.
    pub(crate) fn from_download(container: &str, key: &str, source: StoreError) -> Self {
        match source {
            StoreError::InvalidHeader { .. } => Self::HeaderExtraction {
                container: container.to_string(),
                key: key.to_string(),
                source,
            },
            source => Self::RemoteRead {
                container: container.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }

    /// Classifies a store error raised while uploading.
    pub(crate) fn from_upload(container: &str, key: &str, source: StoreError) -> Self {
        match source {
            StoreError::InvalidHeader { .. } => Self::HeaderExtraction {
                container: container.to_string(),
                key: key.to_string(),
                source,
            },
            source => Self::RemoteWrite {
                container: container.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }

    pub(crate) fn local_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalWrite {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn local_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalRead {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is transient and the transfer may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteRead { source, .. } | Self::RemoteWrite { source, .. } => {
                source.is_retryable()
            }
            Self::LengthMismatch { .. } => true,
            Self::EmptyObject { .. }
            | Self::HeaderExtraction { .. }
            | Self::LocalWrite { .. }
            | Self::LocalRead { .. }
            | Self::LocalStream { .. }
            | Self::InvalidKey { .. } => false,
        }
    }
}
