//! Error types for the study player.

use std::time::Duration;
use thiserror::Error;

/// Authoring errors raised while resolving an experiment structure.
///
/// These are fatal for the parse: they indicate a bug in the researcher-authored
/// JSON, not a transient condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Frame '{0}' is referenced in the sequence but not defined in frames")]
    UnknownFrame(String),

    #[error("Frame '{frame}' uses unknown sampler '{sampler}'")]
    UnknownSampler { frame: String, sampler: String },

    #[error("Frame '{frame}' is malformed: {reason}")]
    MalformedFrame { frame: String, reason: String },

    #[error("Frame '{frame}' has no options to choose from: {reason}")]
    EmptyOptions { frame: String, reason: String },

    #[error("Placeholder '{placeholder}' index {index} is out of range (length {len})")]
    PlaceholderIndexOutOfRange {
        placeholder: String,
        index: usize,
        len: usize,
    },

    #[error("Placeholder '{placeholder}' does not reference an array parameter")]
    PlaceholderNotIndexable { placeholder: String },

    #[error("Placeholder '{0}' references a parameter that is not defined")]
    UnresolvedPlaceholder(String),

    #[error("Invalid experiment structure: {0}")]
    InvalidStructure(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        ConfigurationError::InvalidStructure(err.to_string())
    }
}

/// Errors returned by a multipart storage backend for a single wire call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network failure or storage-side throttling; worth another attempt.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// The storage backend refused the request outright.
    #[error("Storage rejected request: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Errors surfaced by the chunked upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Transient upload failure: {0}")]
    Transient(String),

    #[error("Part {part_number} failed after {attempts} attempt(s): {reason}")]
    Fatal {
        part_number: u32,
        attempts: u32,
        reason: String,
    },

    #[error("Could not create multipart upload: {0}")]
    CreateFailed(String),

    #[error("Multipart completion rejected: {0}")]
    CompletionRejected(String),

    #[error("Could not abort multipart upload: {0}")]
    AbortFailed(String),

    #[error("Upload session failed; no further parts accepted")]
    SessionFailed,

    #[error("Upload has not been created")]
    NotStarted,

    #[error("Timed out after {0:?} waiting for upload to complete")]
    Timeout(Duration),
}

impl UploadError {
    /// True for errors that end the upload session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UploadError::Transient(_) | UploadError::Timeout(_))
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => UploadError::Transient(msg),
            StoreError::Rejected(msg) => UploadError::CompletionRejected(msg),
        }
    }
}

/// Errors raised by the video recording session.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Cannot {action} while recorder is {state}")]
    InvalidTransition { state: String, action: String },

    #[error("Unknown recorder event '{0}'")]
    UnknownEvent(String),

    #[error("Media capture failed: {0}")]
    Capture(String),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

/// Top-level error for the CLI and configuration surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Experiment error: {0}")]
    Experiment(#[from] ConfigurationError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::ConfigError(format!("Invalid JSON: {}", err))
    }
}
