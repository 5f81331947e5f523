//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Experiment(inner) => format!("Invalid experiment: {}", inner),
        ApiError::Upload(inner) if inner.is_fatal() => {
            format!("Upload failed permanently: {}", inner)
        }
        _ => e.to_string(),
    }
}
