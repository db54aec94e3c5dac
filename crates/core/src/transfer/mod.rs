//! Streaming transfer layer.
//!
//! Moves bytes between the object store and local disk without buffering
//! whole objects in memory:
//!
//! - `download`: remote object -> per-object scratch directory
//! - `upload`: any async reader -> remote object (single attempt)
//! - `upload_file`: local file -> remote object, with retry and ETag
//!
//! Transient remote failures are retried with bounded exponential backoff
//! according to `RetryPolicy`. Response headers are logged at debug level.

mod config;
mod download;
mod error;
mod retry;
mod types;
mod upload;

pub use config::{RetryPolicy, TransferConfig};
pub use download::download;
pub use error::TransferError;
pub use types::{DownloadRequest, FileDigest, InputArtifact, UploadReceipt};
pub use upload::{digest_file, upload, upload_file};

use tracing::debug;

use crate::store::RemoteHeaders;

pub(crate) fn log_headers(operation: &str, container: &str, key: &str, headers: &RemoteHeaders) {
    for (name, values) in headers.iter() {
        debug!(operation, container, key, header = name, values = ?values, "Response header");
    }
}
