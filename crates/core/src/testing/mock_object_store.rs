//! Mock object store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::{
    ByteStream, ObjectDownload, ObjectStore, RemoteHeaders, StoreError, UploadRequest,
};

const CHUNK_SIZE: usize = 4096;

/// A recorded upload for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    /// The request that was accepted.
    pub request: UploadRequest,
    /// Bytes received.
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// In-memory implementation of the ObjectStore trait.
///
/// Provides controllable behavior for testing:
/// - Seed objects and inspect uploaded ones
/// - Inject one-shot download/upload failures
/// - Override the declared content length
/// - Count attempts for retry assertions
///
/// Uploads carrying an ETag are verified against the MD5 of the received
/// body, like a Swift server does.
#[derive(Debug, Clone)]
pub struct MockObjectStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    uploads: Arc<RwLock<Vec<RecordedUpload>>>,
    next_download_error: Arc<RwLock<Option<StoreError>>>,
    next_upload_error: Arc<RwLock<Option<StoreError>>>,
    declared_length: Arc<RwLock<Option<u64>>>,
    download_attempts: Arc<RwLock<usize>>,
    upload_attempts: Arc<RwLock<usize>>,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            uploads: Arc::new(RwLock::new(Vec::new())),
            next_download_error: Arc::new(RwLock::new(None)),
            next_upload_error: Arc::new(RwLock::new(None)),
            declared_length: Arc::new(RwLock::new(None)),
            download_attempts: Arc::new(RwLock::new(0)),
            upload_attempts: Arc::new(RwLock::new(0)),
        }
    }

    /// Seed an object.
    pub async fn put_object(&self, container: &str, key: &str, data: Vec<u8>) {
        self.objects.write().await.insert(
            (container.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: None,
            },
        );
    }

    /// Get the stored bytes of an object.
    pub async fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Get the content type an object was uploaded with.
    pub async fn content_type(&self, container: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .and_then(|o| o.content_type.clone())
    }

    /// Keys stored in a container, sorted.
    pub async fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Configure the next download to fail with the given error.
    pub async fn fail_next_download(&self, error: StoreError) {
        *self.next_download_error.write().await = Some(error);
    }

    /// Configure the next upload to fail with the given error.
    pub async fn fail_next_upload(&self, error: StoreError) {
        *self.next_upload_error.write().await = Some(error);
    }

    /// Override the content-length reported by downloads.
    pub async fn set_declared_length(&self, length: Option<u64>) {
        *self.declared_length.write().await = length;
    }

    /// Number of download attempts, failed ones included.
    pub async fn download_count(&self) -> usize {
        *self.download_attempts.read().await
    }

    /// Number of upload attempts, failed ones included.
    pub async fn upload_count(&self) -> usize {
        *self.upload_attempts.read().await
    }

    /// Get all accepted uploads, in order.
    pub async fn recorded_uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.read().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn download(&self, container: &str, key: &str) -> Result<ObjectDownload, StoreError> {
        *self.download_attempts.write().await += 1;

        if let Some(error) = self.next_download_error.write().await.take() {
            return Err(error);
        }

        let object = self
            .objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container: container.to_string(),
                key: key.to_string(),
            })?;

        let declared = self
            .declared_length
            .read()
            .await
            .unwrap_or(object.data.len() as u64);
        let mut headers = RemoteHeaders::new()
            .with("content-length", declared.to_string())
            .with("etag", format!("{:x}", md5::compute(&object.data)));
        if let Some(content_type) = &object.content_type {
            headers.insert("content-type", content_type);
        }

        let chunks: Vec<Result<Bytes, StoreError>> = object
            .data
            .chunks(CHUNK_SIZE)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(ObjectDownload {
            headers,
            body: stream::iter(chunks).boxed(),
        })
    }

    async fn upload(
        &self,
        request: UploadRequest,
        body: ByteStream,
    ) -> Result<RemoteHeaders, StoreError> {
        *self.upload_attempts.write().await += 1;

        if let Some(error) = self.next_upload_error.write().await.take() {
            return Err(error);
        }

        let chunks: Vec<Bytes> = body.try_collect().await?;
        let data = chunks.concat();
        let etag = format!("{:x}", md5::compute(&data));

        if let Some(expected) = &request.etag {
            if !expected.eq_ignore_ascii_case(&etag) {
                return Err(StoreError::Status {
                    status: 422,
                    message: "Unprocessable Entity".to_string(),
                });
            }
        }

        let size_bytes = data.len() as u64;
        self.objects.write().await.insert(
            (request.container.clone(), request.key.clone()),
            StoredObject {
                data,
                content_type: Some(request.content_type.clone()),
            },
        );
        self.uploads.write().await.push(RecordedUpload {
            request,
            size_bytes,
        });

        Ok(RemoteHeaders::new()
            .with("etag", etag)
            .with("content-length", "0")
            .with("x-trans-id", "tx-mock"))
    }
}
