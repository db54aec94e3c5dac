//! Local directory tree object store.
//!
//! Objects live at `<root>/<container>/<key>`. Used for development runs
//! and tests where no remote store is available.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::FsStoreConfig;

use super::types::{
    reader_stream, ByteStream, ObjectDownload, ObjectStore, RemoteHeaders, StoreError,
    UploadRequest,
};

const CHUNK_SIZE: usize = 64 * 1024;

/// File system backed object store.
pub struct FsStore {
    config: FsStoreConfig,
}

impl FsStore {
    pub fn new(config: FsStoreConfig) -> Self {
        Self { config }
    }

    /// Creates a store rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(FsStoreConfig { root: root.into() })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Resolves the on-disk path of an object, rejecting names that would
    /// escape the container directory.
    fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_segment(container)?;
        if key.is_empty() {
            return Err(StoreError::InvalidName("empty object key".to_string()));
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidName(key.to_string()));
        }
        Ok(self.config.root.join(container).join(relative))
    }
}

fn validate_segment(container: &str) -> Result<(), StoreError> {
    if container.is_empty() || container.contains('/') || container == "." || container == ".." {
        return Err(StoreError::InvalidName(container.to_string()));
    }
    Ok(())
}

/// Writes `body` through `file`, returning the body's MD5 and length.
async fn write_body<W>(file: W, mut body: ByteStream) -> Result<(String, u64), StoreError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut context = md5::Context::new();
    let mut total_bytes = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        context.consume(&chunk);
        writer.write_all(&chunk).await?;
        total_bytes += chunk.len() as u64;
    }
    writer.flush().await?;

    Ok((format!("{:x}", context.compute()), total_bytes))
}

#[async_trait]
impl ObjectStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn download(&self, container: &str, key: &str) -> Result<ObjectDownload, StoreError> {
        let path = self.object_path(container, key)?;
        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    container: container.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })?;
        let metadata = file.metadata().await?;

        debug!(path = %path.display(), bytes = metadata.len(), "Opened local object");

        Ok(ObjectDownload {
            headers: RemoteHeaders::new().with("content-length", metadata.len().to_string()),
            body: reader_stream(file, CHUNK_SIZE),
        })
    }

    async fn upload(
        &self,
        request: UploadRequest,
        body: ByteStream,
    ) -> Result<RemoteHeaders, StoreError> {
        let path = self.object_path(&request.container, &request.key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial object.
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        let file = File::create(&partial).await?;
        let (etag, total_bytes) = match write_body(file, body).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Some(expected) = &request.etag {
            if !expected.eq_ignore_ascii_case(&etag) {
                let _ = fs::remove_file(&partial).await;
                return Err(StoreError::Status {
                    status: 422,
                    message: format!("ETag mismatch: expected {}, got {}", expected, etag),
                });
            }
        }

        fs::rename(&partial, &path).await?;

        debug!(
            path = %path.display(),
            bytes = total_bytes,
            content_type = %request.content_type,
            "Stored local object"
        );

        Ok(RemoteHeaders::new()
            .with("etag", etag)
            .with("content-length", "0")
            .with("x-object-size", total_bytes.to_string()))
    }
}
