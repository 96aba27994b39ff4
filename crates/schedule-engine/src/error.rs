//! Error types for schedule-engine operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected input, reported before any write. `field` names the offender.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The text-understanding step produced nothing usable. Recoverable: the
    /// caller may ask the user to capture the label or recording again.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// The recognition service reported a failed job.
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    /// Authorization was still rejected after a forced token refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An external call failed for a reason that may not repeat.
    #[error("External service error: {0}")]
    Transient(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
