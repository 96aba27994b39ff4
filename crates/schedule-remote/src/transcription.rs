//! Token-authenticated HTTP speech/OCR backend.
//!
//! Wire protocol:
//! - `POST {base}/v1/authenticate` with form `client_id`, `client_secret` →
//!   `{"access_token": "...", "expire_at": <unix seconds>}`
//! - `POST {base}/v1/transcribe` multipart `file` + `config` (JSON) →
//!   `{"id": "..."}`
//! - `GET {base}/v1/transcribe/{id}` →
//!   `{"status": "transcribing" | "completed" | "failed", "results": {"utterances": [{"msg": "..."}]}}`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use schedule_engine::transcription::{
    AccessToken, BackendError, JobId, JobStatus, Media, TranscriptionBackend,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::chat::{error_message, read_json};
use crate::config::{required, TranscriptionEndpoint};
use crate::error::{RemoteError, Result};

pub struct HttpTranscriptionBackend {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    options: String,
}

impl HttpTranscriptionBackend {
    pub fn from_settings(settings: &TranscriptionEndpoint) -> Result<Self> {
        let base_url = required(&settings.base_url, "remote.transcription.base_url")?;
        let client_id = required(&settings.client_id, "remote.transcription.client_id")?;
        let client_secret =
            required(&settings.client_secret, "remote.transcription.client_secret")?;
        // Options must be a JSON document.
        serde_json::from_str::<Value>(&settings.options)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            options: settings.options.clone(),
        })
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let response = self
            .http
            .post(format!("{}/v1/authenticate", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        parse_token(&read_json(response).await?)
    }

    async fn submit_job(&self, token: &str, media: &Media) -> Result<JobId> {
        let file = Part::bytes(media.bytes.clone())
            .file_name(media.file_name.clone())
            .mime_str(&media.content_type)?;
        let form = Form::new()
            .part("file", file)
            .text("config", self.options.clone());
        let response = self
            .http
            .post(format!("{}/v1/transcribe", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        parse_job_id(&read_json(response).await?)
    }

    async fn job_status(&self, token: &str, job: &JobId) -> Result<JobStatus> {
        let response = self
            .http
            .get(format!("{}/v1/transcribe/{}", self.base_url, job))
            .bearer_auth(token)
            .send()
            .await?;
        parse_job_status(&read_json(response).await?)
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriptionBackend {
    #[instrument(skip_all)]
    async fn authenticate(&self) -> std::result::Result<AccessToken, BackendError> {
        let token = self.request_token().await?;
        debug!(expires_at = %token.expires_at, "authenticated with transcription service");
        Ok(token)
    }

    #[instrument(skip_all, fields(file = %media.file_name))]
    async fn submit(&self, token: &str, media: &Media) -> std::result::Result<JobId, BackendError> {
        Ok(self.submit_job(token, media).await?)
    }

    async fn poll(&self, token: &str, job: &JobId) -> std::result::Result<JobStatus, BackendError> {
        Ok(self.job_status(token, job).await?)
    }
}

/// `{"access_token", "expire_at"}` → token. `expire_at` is unix seconds.
pub fn parse_token(body: &Value) -> Result<AccessToken> {
    let value = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::UnexpectedResponse("no access_token".into()))?;
    let expires_at = body
        .get("expire_at")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| RemoteError::UnexpectedResponse("no usable expire_at".into()))?;
    Ok(AccessToken {
        value: value.to_string(),
        expires_at,
    })
}

pub fn parse_job_id(body: &Value) -> Result<JobId> {
    match body.get("id") {
        Some(Value::String(id)) => Ok(JobId(id.clone())),
        Some(Value::Number(id)) => Ok(JobId(id.to_string())),
        _ => Err(RemoteError::UnexpectedResponse("no job id".into())),
    }
}

/// Map a job body to a status. Completed jobs join their utterances with
/// single spaces.
pub fn parse_job_status(body: &Value) -> Result<JobStatus> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::UnexpectedResponse("no job status".into()))?;
    match status {
        "completed" => {
            let text = body
                .pointer("/results/utterances")
                .and_then(Value::as_array)
                .map(|utterances| {
                    utterances
                        .iter()
                        .filter_map(|u| u.get("msg").and_then(Value::as_str))
                        .map(str::trim)
                        .filter(|msg| !msg.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            Ok(JobStatus::Completed(text))
        }
        "failed" => Ok(JobStatus::Failed(error_message(body))),
        _ => Ok(JobStatus::Pending),
    }
}
