//! Types for object store operations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Errors that can occur while talking to an object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {container}/{key}")]
    NotFound { container: String, key: String },

    #[error("Authentication rejected: {0}")]
    Unauthorized(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the failure is transient and the request may be retried.
    ///
    /// Throttling, request timeouts and server-side errors are transient.
    /// Rejected credentials, missing objects and malformed names are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Timeout | Self::Transport(_) | Self::Io(_) => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::NotFound { .. }
            | Self::Unauthorized(_)
            | Self::InvalidHeader { .. }
            | Self::InvalidName(_) => false,
        }
    }
}

/// Response header metadata returned by the store.
///
/// Names are lowercased. Values keep the order the store sent them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteHeaders(BTreeMap<String, Vec<String>>);

impl RemoteHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for the given header name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Builder-style variant of [`RemoteHeaders::insert`].
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// All values for a header name.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(|values| values.as_slice())
    }

    /// First value for a header name.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(|value| value.as_str())
    }

    /// Declared `content-length`, if present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.first("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A stream of object body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// An opened remote object.
pub struct ObjectDownload {
    /// Response headers of the download request.
    pub headers: RemoteHeaders,
    /// Object body.
    pub body: ByteStream,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Parameters of an object upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub container: String,
    pub key: String,
    pub content_type: String,
    /// Expected MD5 of the body (hex). Stores that support it reject a
    /// body that does not match.
    pub etag: Option<String>,
}

impl UploadRequest {
    pub fn new(
        container: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
            content_type: content_type.into(),
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// A remote object store holding keyed objects in named containers.
///
/// Implementations must be safe to share between concurrent uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Opens an object for streaming retrieval.
    async fn download(&self, container: &str, key: &str) -> Result<ObjectDownload, StoreError>;

    /// Streams `body` into `request.container/request.key`, replacing any
    /// existing object.
    async fn upload(
        &self,
        request: UploadRequest,
        body: ByteStream,
    ) -> Result<RemoteHeaders, StoreError>;
}

/// Turns an async reader into a [`ByteStream`] of at most `chunk_size` byte chunks.
pub fn reader_stream<R>(reader: R, chunk_size: usize) -> ByteStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let chunk_size = chunk_size.max(1);
    stream::try_unfold(reader, move |mut reader| async move {
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => {
                buf.truncate(n);
                Ok(Some((Bytes::from(buf), reader)))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    })
    .boxed()
}
