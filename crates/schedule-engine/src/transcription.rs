//! Speech/OCR transcription client: token lifecycle, job submission, and
//! bounded polling.
//!
//! The token is shared mutable state. Callers refresh it when it is missing
//! or within the refresh threshold of expiry; concurrent refreshes are
//! tolerated and the last write wins. A rejected token triggers exactly one
//! forced refresh and one retry of the failed call.

use std::fmt;
use std::future::Future;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token expires within `threshold` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at - now <= threshold
    }
}

/// Audio or image payload to transcribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Completed(String),
    Failed(String),
}

/// Failure classes reported by a transcription backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The token was rejected (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Timeouts, throttling, 5xx. Worth another polling attempt.
    #[error("transient: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(msg) => EngineError::Unauthorized(msg),
            BackendError::Transient(msg) => EngineError::Transient(msg),
            BackendError::Fatal(msg) => EngineError::RecognitionFailed(msg),
        }
    }
}

/// Wire-level operations of a transcription provider.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn authenticate(&self) -> std::result::Result<AccessToken, BackendError>;

    async fn submit(&self, token: &str, media: &Media) -> std::result::Result<JobId, BackendError>;

    async fn poll(&self, token: &str, job: &JobId) -> std::result::Result<JobStatus, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub refresh_threshold_secs: i64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_ms: 3000,
            refresh_threshold_secs: 300,
        }
    }
}

pub struct Transcriber<B> {
    backend: B,
    token: RwLock<Option<AccessToken>>,
    settings: TranscriptionSettings,
}

impl<B: TranscriptionBackend> Transcriber<B> {
    pub fn new(backend: B, settings: TranscriptionSettings) -> Self {
        Self {
            backend,
            token: RwLock::new(None),
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn current_token(&self) -> Result<String> {
        let threshold = Duration::seconds(self.settings.refresh_threshold_secs);
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.expires_within(Utc::now(), threshold) {
                return Ok(token.value.clone());
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String> {
        let token = self.backend.authenticate().await?;
        debug!(expires_at = %token.expires_at, "refreshed transcription token");
        let value = token.value.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }

    /// Run `call` with a valid token. On `Unauthorized`, refresh once and
    /// retry once; a second rejection is final.
    async fn authorized<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let token = self.current_token().await?;
        match call(token).await {
            Err(BackendError::Unauthorized(reason)) => {
                warn!(%reason, "transcription token rejected, refreshing once");
                let token = self.refresh().await?;
                call(token).await.map_err(EngineError::from)
            }
            other => other.map_err(EngineError::from),
        }
    }

    /// Submit `media` and return the provider's job id.
    #[instrument(skip_all, fields(file = %media.file_name, bytes = media.bytes.len()))]
    pub async fn submit(&self, media: &Media) -> Result<JobId> {
        self.authorized(|token| async move { self.backend.submit(&token, media).await })
            .await
    }

    /// Check a job once.
    pub async fn poll(&self, job: &JobId) -> Result<JobStatus> {
        self.authorized(|token| async move { self.backend.poll(&token, job).await })
            .await
    }

    /// Poll until the job completes, at most `poll_attempts` times with
    /// `poll_interval_ms` between attempts. Transient failures use up an
    /// attempt; anything else ends the loop.
    #[instrument(skip_all, fields(job = %job))]
    pub async fn wait_for_text(&self, job: &JobId) -> Result<String> {
        let attempts = self.settings.poll_attempts.max(1);
        let interval = StdDuration::from_millis(self.settings.poll_interval_ms);
        for attempt in 1..=attempts {
            match self.poll(job).await {
                Ok(JobStatus::Completed(text)) => return Ok(text),
                Ok(JobStatus::Failed(reason)) => return Err(EngineError::RecognitionFailed(reason)),
                Ok(JobStatus::Pending) => debug!(attempt, "transcription pending"),
                Err(EngineError::Transient(reason)) => {
                    warn!(attempt, %reason, "transcription poll failed");
                }
                Err(other) => return Err(other),
            }
            if attempt < attempts {
                sleep(interval).await;
            }
        }
        Err(EngineError::Timeout(format!(
            "transcription job {job} not finished after {attempts} attempts"
        )))
    }

    /// Submit and wait, bounded by the caller's `deadline`.
    pub async fn transcribe(&self, media: &Media, deadline: StdDuration) -> Result<String> {
        timeout(deadline, async {
            let job = self.submit(media).await?;
            self.wait_for_text(&job).await
        })
        .await
        .map_err(|_| EngineError::Timeout(format!("transcription exceeded {deadline:?}")))?
    }
}
