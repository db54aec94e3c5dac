//! Streaming upload of local artifacts.

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::info;

use crate::store::{reader_stream, ObjectStore, RemoteHeaders, StoreError, UploadRequest};

use super::config::TransferConfig;
use super::error::TransferError;
use super::log_headers;
use super::types::{FileDigest, UploadReceipt};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Streams `reader` to `container/key` with the given content type.
///
/// Single attempt: the reader is consumed and cannot be replayed.
pub async fn upload<S, R>(
    store: &S,
    content_type: &str,
    container: &str,
    key: &str,
    reader: R,
) -> Result<RemoteHeaders, TransferError>
where
    S: ObjectStore + ?Sized,
    R: AsyncRead + Send + Unpin + 'static,
{
    send(
        store,
        UploadRequest::new(container, key, content_type),
        reader,
        DEFAULT_CHUNK_SIZE,
        None,
    )
    .await
}

/// Uploads a local file, retrying transient failures by reopening it.
///
/// The file's MD5 is sent as the expected ETag so the store can verify
/// what it received.
pub async fn upload_file<S>(
    store: &S,
    content_type: &str,
    container: &str,
    key: &str,
    path: &Path,
    config: &TransferConfig,
) -> Result<UploadReceipt, TransferError>
where
    S: ObjectStore + ?Sized,
{
    let digest = digest_file(path, config.chunk_size).await?;
    let request = UploadRequest::new(container, key, content_type).with_etag(digest.md5.clone());

    info!(
        store = store.name(),
        container,
        key,
        content_type,
        bytes = digest.size_bytes,
        path = %path.display(),
        "Uploading artifact"
    );

    let chunk_size = config.chunk_size;
    let headers = config
        .retry
        .run("upload", |_| {
            let request = request.clone();
            async move {
                let file = File::open(path)
                    .await
                    .map_err(|e| TransferError::local_read(path, e))?;
                send(store, request, file, chunk_size, Some(path)).await
            }
        })
        .await?;

    Ok(UploadReceipt {
        container: container.to_string(),
        key: key.to_string(),
        content_type: content_type.to_string(),
        size_bytes: digest.size_bytes,
        sha256: digest.sha256,
        headers,
    })
}

/// Streams `reader` to the store.
///
/// A failure of the local reader is kept aside and reported as a local
/// error, whatever the store turned it into.
async fn send<S, R>(
    store: &S,
    request: UploadRequest,
    reader: R,
    chunk_size: usize,
    local_path: Option<&Path>,
) -> Result<RemoteHeaders, TransferError>
where
    S: ObjectStore + ?Sized,
    R: AsyncRead + Send + Unpin + 'static,
{
    let container = request.container.clone();
    let key = request.key.clone();

    let read_error: Arc<Mutex<Option<std::io::Error>>> = Arc::default();
    let slot = Arc::clone(&read_error);
    let body = reader_stream(reader, chunk_size)
        .map_err(move |e| match e {
            StoreError::Io(source) => {
                let forwarded = std::io::Error::new(source.kind(), source.to_string());
                if let Ok(mut slot) = slot.lock() {
                    slot.get_or_insert(source);
                }
                StoreError::Io(forwarded)
            }
            other => other,
        })
        .boxed();

    let result = store.upload(request, body).await;
    let local_failure = read_error.lock().ok().and_then(|mut slot| slot.take());
    let headers = match (result, local_failure) {
        (Ok(headers), _) => headers,
        (Err(_), Some(source)) => {
            return Err(match local_path {
                Some(path) => TransferError::local_read(path, source),
                None => TransferError::LocalStream {
                    container,
                    key,
                    source,
                },
            })
        }
        (Err(e), None) => return Err(TransferError::from_upload(&container, &key, e)),
    };
    log_headers("upload", &container, &key, &headers);

    Ok(headers)
}

/// Computes the size, SHA-256 and MD5 of a local file in one pass.
pub async fn digest_file(path: &Path, chunk_size: usize) -> Result<FileDigest, TransferError> {
    let chunk_size = chunk_size.max(1);
    let file = File::open(path)
        .await
        .map_err(|e| TransferError::local_read(path, e))?;
    let mut reader = BufReader::with_capacity(chunk_size, file);
    let mut buffer = vec![0u8; chunk_size];

    let mut sha256 = Sha256::new();
    let mut md5 = md5::Context::new();
    let mut size_bytes = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| TransferError::local_read(path, e))?;
        if bytes_read == 0 {
            break;
        }
        sha256.update(&buffer[..bytes_read]);
        md5.consume(&buffer[..bytes_read]);
        size_bytes += bytes_read as u64;
    }

    Ok(FileDigest {
        size_bytes,
        sha256: format!("{:x}", sha256.finalize()),
        md5: format!("{:x}", md5.compute()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockObjectStore;
    use crate::transfer::RetryPolicy;
    use tempfile::TempDir;

    fn fast_config() -> TransferConfig {
        TransferConfig::default().with_retry(RetryPolicy::default().with_delays(1, 1))
    }

    #[tokio::test]
    async fn test_upload_reader() {
        let store = MockObjectStore::new();

        let headers = upload(
            &store,
            "video/webm",
            "video_output",
            "movie.webm",
            std::io::Cursor::new(b"webm".to_vec()),
        )
        .await
        .unwrap();

        assert!(headers.first("etag").is_some());
        assert_eq!(
            store.object("video_output", "movie.webm").await.unwrap(),
            b"webm"
        );
        let uploads = store.recorded_uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].request.content_type, "video/webm");
        assert_eq!(uploads[0].request.etag, None);
    }

    #[tokio::test]
    async fn test_upload_file_sends_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.mp4");
        std::fs::write(&path, b"mp4 payload").unwrap();
        let store = MockObjectStore::new();

        let receipt = upload_file(&store, "video/mp4", "out", "movie.mp4", &path, &fast_config())
            .await
            .unwrap();

        assert_eq!(receipt.size_bytes, 11);
        assert_eq!(
            receipt.sha256,
            format!("{:x}", Sha256::digest(b"mp4 payload"))
        );
        let uploads = store.recorded_uploads().await;
        assert_eq!(
            uploads[0].request.etag.as_deref(),
            Some(format!("{:x}", md5::compute(b"mp4 payload")).as_str())
        );
    }

    #[tokio::test]
    async fn test_upload_file_missing_is_local_read() {
        let temp = TempDir::new().unwrap();
        let store = MockObjectStore::new();

        let result = upload_file(
            &store,
            "image/jpg",
            "out",
            "movie.jpg",
            &temp.path().join("movie.jpg"),
            &fast_config(),
        )
        .await;

        assert!(matches!(result, Err(TransferError::LocalRead { .. })));
        assert_eq!(store.upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_file_retries_server_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.webm");
        std::fs::write(&path, b"webm").unwrap();
        let store = MockObjectStore::new();
        store
            .fail_next_upload(StoreError::Status {
                status: 503,
                message: "unavailable".into(),
            })
            .await;

        upload_file(&store, "video/webm", "out", "movie.webm", &path, &fast_config())
            .await
            .unwrap();

        assert_eq!(store.upload_count().await, 2);
        assert_eq!(store.object("out", "movie.webm").await.unwrap(), b"webm");
    }

    #[tokio::test]
    async fn test_upload_rejected_credentials_not_retried() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.webm");
        std::fs::write(&path, b"webm").unwrap();
        let store = MockObjectStore::new();
        store
            .fail_next_upload(StoreError::Unauthorized("expired token".into()))
            .await;

        let result =
            upload_file(&store, "video/webm", "out", "movie.webm", &path, &fast_config()).await;

        assert!(matches!(result, Err(TransferError::RemoteWrite { .. })));
        assert_eq!(store.upload_count().await, 1);
    }

    #[tokio::test]
    async fn test_digest_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let digest = digest_file(&path, 16).await.unwrap();
        assert_eq!(digest.size_bytes, 0);
        assert_eq!(digest.md5, "d41d8cd98f00b204e9800998ecf8427e");
    }

    struct UnreadableDisk;

    impl AsyncRead for UnreadableDisk {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "local disk read failed",
            )))
        }
    }

    #[tokio::test]
    async fn test_reader_failure_is_local() {
        let store = MockObjectStore::new();

        let result = upload(&store, "video/webm", "out", "movie.webm", UnreadableDisk).await;

        match result {
            Err(err @ TransferError::LocalStream { .. }) => assert!(!err.is_retryable()),
            other => panic!("expected LocalStream, got {:?}", other),
        }
        assert!(store.object("out", "movie.webm").await.is_none());
    }

    #[tokio::test]
    async fn test_file_read_failure_is_local_read_and_not_retried() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.webm");
        std::fs::write(&path, b"webm").unwrap();
        let store = MockObjectStore::new();

        let result = send(
            &store,
            UploadRequest::new("out", "movie.webm", "video/webm"),
            UnreadableDisk,
            16,
            Some(path.as_path()),
        )
        .await;

        match result {
            Err(err @ TransferError::LocalRead { .. }) => assert!(!err.is_retryable()),
            other => panic!("expected LocalRead, got {:?}", other),
        }
        assert_eq!(store.upload_count().await, 1);
    }

    #[tokio::test]
    async fn test_upload_invalid_header_not_retried() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.webm");
        std::fs::write(&path, b"webm").unwrap();
        let store = MockObjectStore::new();
        store
            .fail_next_upload(StoreError::InvalidHeader {
                name: "etag".into(),
                reason: "not valid UTF-8".into(),
            })
            .await;

        let result =
            upload_file(&store, "video/webm", "out", "movie.webm", &path, &fast_config()).await;

        assert!(matches!(result, Err(TransferError::HeaderExtraction { .. })));
        assert_eq!(store.upload_count().await, 1);
    }
}
