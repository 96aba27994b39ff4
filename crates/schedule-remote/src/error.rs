//! Error types for the HTTP providers.

use schedule_engine::error::EngineError;
use schedule_engine::transcription::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The body parsed but lacked a field the provider always sends.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            RemoteError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Api { status: 401, .. })
    }
}

impl From<RemoteError> for BackendError {
    fn from(err: RemoteError) -> Self {
        if err.is_unauthorized() {
            BackendError::Unauthorized(err.to_string())
        } else if err.is_transient() {
            BackendError::Transient(err.to_string())
        } else {
            BackendError::Fatal(err.to_string())
        }
    }
}

impl From<RemoteError> for EngineError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::MissingSetting(_) | RemoteError::Config(_) => {
                EngineError::Config(err.to_string())
            }
            _ if err.is_unauthorized() => EngineError::Unauthorized(err.to_string()),
            _ => EngineError::Transient(err.to_string()),
        }
    }
}
