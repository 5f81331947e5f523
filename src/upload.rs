//! Chunked multipart upload
//!
//! Media chunks are buffered into size-bounded parts, each part is sent with a
//! bounded retry loop, and the upload is finalized with the ordered list of
//! acknowledged parts. Storage is reached through the [`MultipartStore`] port.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod http;
pub mod manager;
pub mod memory;

pub use http::HttpMultipartStore;
pub use manager::{CompletedUpload, UploadManager};
pub use memory::MemoryStore;

/// Parts are flushed once the buffer reaches this many bytes.
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;
/// Attempts per part, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const VIDEO_CONTENT_TYPE: &str = "video/webm";
pub const VIDEO_EXTENSION: &str = "webm";

/// Object key for a recording: `<videoFilename>.webm`.
pub fn video_object_key(video_filename: &str) -> String {
    format!("{}.{}", video_filename, VIDEO_EXTENSION)
}

/// One part of a multipart upload. `e_tag` is set only once storage has
/// acknowledged the part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPart {
    pub part_number: u32,
    pub size: usize,
    pub e_tag: Option<String>,
}

/// Part reference sent with the completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub e_tag: String,
}

/// Snapshot of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub key: String,
    pub upload_id: String,
    /// Every submitted part in part-number order.
    pub parts: Vec<UploadPart>,
    /// Bytes buffered but not yet flushed.
    pub pending_bytes: usize,
}

/// Storage port for multipart uploads
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Start a multipart upload and return its session token.
    async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String, StoreError>;

    /// Upload one part and return its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError>;

    /// Finalize the upload from the ordered part list.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError>;

    /// Discard the upload and any parts already stored.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError>;
}

/// Upload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the multipart storage gateway.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts; doubles after each failure.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bucket() -> String {
    "study-recordings".to_string()
}

fn default_part_size() -> usize {
    DEFAULT_PART_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
            part_size_bytes: default_part_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.part_size_bytes == 0 {
            return Err("part_size_bytes must be greater than zero".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.bucket.is_empty() {
            return Err("bucket cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint '{}' is not an http(s) URL", endpoint));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Bounded exponential retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        UploadConfig::default().retry_policy()
    }
}
