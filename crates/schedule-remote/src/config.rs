//! Provider endpoints and credentials, read from the `[remote]` section of the
//! same sources the engine settings use.

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{RemoteError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub llm: LlmSettings,
    pub transcription: TranscriptionEndpoint,
}

/// OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionEndpoint {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Recognition options sent verbatim with each job, as a JSON object.
    pub options: String,
    pub timeout_secs: u64,
}

impl Default for TranscriptionEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            options: "{}".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Root {
    remote: RemoteSettings,
}

impl RemoteSettings {
    /// Load `[remote]` from `path` (or an optional `schedule.toml`), then
    /// `SCHEDULE_REMOTE__*` environment overrides, e.g.
    /// `SCHEDULE_REMOTE__LLM__API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("schedule").required(false),
        };
        let root: Root = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SCHEDULE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        Ok(root.remote)
    }
}

/// Return `value` or fail naming the setting when it is blank.
pub(crate) fn required<'a>(value: &'a str, name: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(RemoteError::MissingSetting(name))
    } else {
        Ok(trimmed)
    }
}
