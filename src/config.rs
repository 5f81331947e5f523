//! Configuration System
//!
//! Layered player configuration: built-in defaults, a user-level file, the
//! workspace files, then `STUDYPLAYER__*` environment variables. Tests included.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::parser::ParserConfig;
use crate::recorder::RecorderConfig;
use crate::upload::UploadConfig;
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Experiment resolution settings
    #[serde(default)]
    pub parser: ParserConfig,

    /// Multipart upload settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Recording session settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Upload(String),
    Recorder(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Upload(msg) => write!(f, "Upload: {}", msg),
            ValidationError::Recorder(msg) => write!(f, "Recorder: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_logging(logging: &LoggingConfig) -> Result<(), String> {
    if !matches!(logging.format.as_str(), "text" | "json") {
        return Err(format!("unknown format '{}'", logging.format));
    }
    match logging.output.as_str() {
        "stdout" | "stderr" => Ok(()),
        "file" if logging.file.is_some() => Ok(()),
        "file" => Err("output 'file' requires a log file path".to_string()),
        other => Err(format!("unknown output '{}'", other)),
    }
}

impl PlayerConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.upload.validate() {
            errors.push(ValidationError::Upload(e));
        }
        if let Err(e) = self.recorder.validate() {
            errors.push(ValidationError::Recorder(e));
        }
        if let Err(e) = validate_logging(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one [`ApiError::ConfigError`].
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
