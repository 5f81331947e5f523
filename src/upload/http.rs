//! HTTP multipart store
//!
//! Talks to a storage gateway that exposes the S3 multipart routes with JSON
//! bodies:
//!
//! - `POST   {endpoint}/{bucket}/{key}?uploads` → `{"UploadId": ...}`
//! - `PUT    {endpoint}/{bucket}/{key}?partNumber=N&uploadId=ID` → `ETag` header
//! - `POST   {endpoint}/{bucket}/{key}?uploadId=ID` with `{"Parts": [...]}`
//! - `DELETE {endpoint}/{bucket}/{key}?uploadId=ID`

use super::{CompletedPart, MultipartStore, UploadConfig};
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize)]
struct CreateMultipartResponse {
    #[serde(rename = "UploadId")]
    upload_id: String,
}

#[derive(Serialize)]
struct CompleteMultipartRequest<'a> {
    #[serde(rename = "Parts")]
    parts: &'a [CompletedPart],
}

// Connection problems, timeouts, throttling and server errors are worth retrying.
fn map_http_error(error: reqwest::Error) -> StoreError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        return StoreError::Transient(error.to_string());
    }
    match error.status() {
        Some(status) if is_transient_status(status) => StoreError::Transient(error.to_string()),
        _ => StoreError::Rejected(error.to_string()),
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body);
    if is_transient_status(status) {
        Err(StoreError::Transient(message))
    } else {
        Err(StoreError::Rejected(message))
    }
}

/// Multipart store backed by an HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpMultipartStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpMultipartStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Rejected(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        })
    }

    /// Build from upload settings; requires `endpoint`.
    pub fn from_config(config: &UploadConfig) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| StoreError::Rejected("upload endpoint is not configured".to_string()))?;
        Self::new(
            endpoint,
            config.bucket.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl MultipartStore for HttpMultipartStore {
    async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String, StoreError> {
        let response = self
            .client
            .post(format!("{}?uploads", self.object_url(key)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .send()
            .await
            .map_err(map_http_error)?;
        let created: CreateMultipartResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(map_http_error)?;
        Ok(created.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError> {
        debug!(key, part_number, size = body.len(), "Sending part");
        let response = self
            .client
            .put(self.object_url(key))
            .query(&[
                ("partNumber", part_number.to_string()),
                ("uploadId", upload_id.to_string()),
            ])
            .body(body.to_vec())
            .send()
            .await
            .map_err(map_http_error)?;
        let response = check_status(response).await?;
        response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Transient(format!("part {} response had no ETag", part_number))
            })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.object_url(key))
            .query(&[("uploadId", upload_id)])
            .json(&CompleteMultipartRequest { parts })
            .send()
            .await
            .map_err(map_http_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.object_url(key))
            .query(&[("uploadId", upload_id)])
            .send()
            .await
            .map_err(map_http_error)?;
        check_status(response).await?;
        Ok(())
    }
}
