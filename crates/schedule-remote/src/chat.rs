//! OpenAI-compatible chat-completions client used as the text-understanding
//! service.

use std::time::Duration;

use async_trait::async_trait;
use schedule_engine::error::EngineError;
use schedule_engine::extractor::TextUnderstanding;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{required, LlmSettings};
use crate::error::{RemoteError, Result};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

/// Client for a `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Build a client from settings. Fails when the API key is blank.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = required(&settings.api_key, "remote.llm.api_key")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    /// Send `instruction` as the system message and `text` as the user
    /// message; return the first choice's content.
    #[instrument(skip(self, instruction, text), fields(model = %self.model, text_len = text.len()))]
    pub async fn chat(&self, instruction: &str, text: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
        };

        debug!("sending chat completion request");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        parse_completion(&read_json(response).await?)
    }
}

/// Decode a successful response as JSON. Any other status becomes
/// `RemoteError::Api` whatever the body holds, so a bare 401 or an HTML 503
/// keeps its status.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Api {
            status: status.as_u16(),
            message: failure_message(&body),
        });
    }
    Ok(response.json().await?)
}

/// `error.message` of an error body, or a placeholder.
pub fn error_message(body: &Value) -> String {
    message_of(body).unwrap_or("Unknown error").to_string()
}

/// Message for a failed response body: the JSON error message when there is
/// one, else the trimmed raw text.
pub fn failure_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = message_of(&value) {
            return message.to_string();
        }
    }
    match body.trim() {
        "" => "Unknown error".to_string(),
        text => text.to_string(),
    }
}

fn message_of(body: &Value) -> Option<&str> {
    body.get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
}

/// Content of `choices[0].message`. Array-of-parts content is flattened to
/// its text parts.
pub fn parse_completion(body: &Value) -> Result<String> {
    let content = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .ok_or_else(|| RemoteError::UnexpectedResponse("no choices[0].message.content".into()))?;

    match content {
        Value::String(text) => Ok(text.clone()),
        Value::Array(parts) => Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("")),
        other => Err(RemoteError::UnexpectedResponse(format!(
            "message content is {other}"
        ))),
    }
}

#[async_trait]
impl TextUnderstanding for ChatCompletionClient {
    async fn complete(&self, instruction: &str, text: &str) -> schedule_engine::error::Result<String> {
        self.chat(instruction, text).await.map_err(EngineError::from)
    }
}
