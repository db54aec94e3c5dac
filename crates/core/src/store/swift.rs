//! OpenStack Swift (Rackspace Cloud Files) object store client.
//!
//! Authentication is not performed here: the storage URL and token are
//! obtained out of band (identity service, environment) and supplied once
//! at startup through [`SwiftConfig`].

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG};
use reqwest::{Body, Client, Response};
use tracing::debug;

use crate::config::SwiftConfig;

use super::types::{
    ByteStream, ObjectDownload, ObjectStore, RemoteHeaders, StoreError, UploadRequest,
};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Swift object store client.
pub struct SwiftStore {
    client: Client,
    config: SwiftConfig,
}

impl SwiftStore {
    /// Creates a new Swift client.
    pub fn new(config: SwiftConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Builds the URL of an object, percent-encoding each key segment.
    fn object_url(&self, container: &str, key: &str) -> Result<String, StoreError> {
        if container.is_empty() || container.contains('/') {
            return Err(StoreError::InvalidName(container.to_string()));
        }
        if key.is_empty() {
            return Err(StoreError::InvalidName("empty object key".to_string()));
        }

        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}/{}",
            self.config.storage_url.trim_end_matches('/'),
            urlencoding::encode(container),
            encoded_key
        ))
    }

    /// Maps a non-success response to a store error.
    async fn check_status(
        response: Response,
        container: &str,
        key: &str,
    ) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body, container, key))
    }
}

fn status_error(status: u16, body: &str, container: &str, key: &str) -> StoreError {
    match status {
        401 | 403 => StoreError::Unauthorized(format!("HTTP {}", status)),
        404 => StoreError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Status {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout
    } else if e.is_connect() {
        StoreError::ConnectionFailed(e.to_string())
    } else {
        StoreError::Transport(e.to_string())
    }
}

/// Converts response headers, failing on values that are not valid UTF-8.
fn extract_headers(headers: &HeaderMap) -> Result<RemoteHeaders, StoreError> {
    let mut extracted = RemoteHeaders::new();
    for (name, value) in headers {
        let value = value.to_str().map_err(|e| StoreError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        extracted.insert(name.as_str(), value);
    }
    Ok(extracted)
}

#[async_trait]
impl ObjectStore for SwiftStore {
    fn name(&self) -> &str {
        "swift"
    }

    async fn download(&self, container: &str, key: &str) -> Result<ObjectDownload, StoreError> {
        let url = self.object_url(container, key)?;
        debug!(url = %url, "Swift GET");

        let response = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &self.config.auth_token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = Self::check_status(response, container, key).await?;
        let headers = extract_headers(response.headers())?;

        let body = response.bytes_stream().map_err(map_reqwest_error).boxed();

        Ok(ObjectDownload { headers, body })
    }

    async fn upload(
        &self,
        request: UploadRequest,
        body: ByteStream,
    ) -> Result<RemoteHeaders, StoreError> {
        let url = self.object_url(&request.container, &request.key)?;
        debug!(url = %url, content_type = %request.content_type, "Swift PUT");

        let mut builder = self
            .client
            .put(&url)
            .header(AUTH_TOKEN_HEADER, &self.config.auth_token)
            .header(CONTENT_TYPE, &request.content_type);
        if let Some(etag) = &request.etag {
            builder = builder.header(ETAG, etag);
        }

        let response = builder
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = Self::check_status(response, &request.container, &request.key).await?;

        extract_headers(response.headers())
    }
}
