//! Streaming download of the pipeline input.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

use crate::store::{ObjectStore, RemoteHeaders};

use super::config::TransferConfig;
use super::error::TransferError;
use super::log_headers;
use super::types::{DownloadRequest, InputArtifact};

/// Downloads `request.container/request.key` into a fresh scratch directory.
///
/// The remote body is copied chunk by chunk into the local file. Transient
/// failures restart the copy from the beginning, truncating the file.
pub async fn download<S>(
    store: &S,
    request: &DownloadRequest,
    config: &TransferConfig,
) -> Result<InputArtifact, TransferError>
where
    S: ObjectStore + ?Sized,
{
    let scratch_dir = request.scratch_dir()?;
    let local_path = request.local_path()?;

    fs::create_dir_all(&scratch_dir)
        .await
        .map_err(|e| TransferError::local_write(&scratch_dir, e))?;

    info!(
        store = store.name(),
        container = %request.container,
        key = %request.key,
        path = %local_path.display(),
        "Downloading input object"
    );

    let path = local_path.as_path();
    let chunk_size = config.chunk_size;
    let (size_bytes, headers) = config
        .retry
        .run("download", move |_| {
            stream_to_file(store, request, path, chunk_size)
        })
        .await?;

    if size_bytes == 0 {
        if !config.allow_empty_input {
            return Err(TransferError::EmptyObject {
                container: request.container.clone(),
                key: request.key.clone(),
            });
        }
        warn!(
            container = %request.container,
            key = %request.key,
            "Remote object is empty, continuing with a zero-byte input"
        );
    }

    info!(
        key = %request.key,
        bytes = size_bytes,
        "Input object downloaded"
    );

    Ok(InputArtifact {
        container: request.container.clone(),
        key: request.key.clone(),
        local_path,
        size_bytes,
        headers,
    })
}

/// One download attempt: open the remote stream and copy it to `path`.
async fn stream_to_file<S>(
    store: &S,
    request: &DownloadRequest,
    path: &Path,
    chunk_size: usize,
) -> Result<(u64, RemoteHeaders), TransferError>
where
    S: ObjectStore + ?Sized,
{
    let container = request.container.as_str();
    let key = request.key.as_str();

    let download = store
        .download(container, key)
        .await
        .map_err(|e| TransferError::from_download(container, key, e))?;
    log_headers("download", container, key, &download.headers);

    let file = File::create(path)
        .await
        .map_err(|e| TransferError::local_write(path, e))?;
    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);

    let mut body = download.body;
    let mut received = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| TransferError::from_download(container, key, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::local_write(path, e))?;
        received += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::local_write(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| TransferError::local_write(path, e))?;

    if let Some(declared) = download.headers.content_length() {
        if declared != received {
            return Err(TransferError::LengthMismatch {
                container: container.to_string(),
                key: key.to_string(),
                declared,
                received,
            });
        }
    }

    Ok((received, download.headers))
}
