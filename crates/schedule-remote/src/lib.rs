//! # schedule-remote
//!
//! HTTP implementations of the schedule engine's external collaborators.
//!
//! - [`chat`] — OpenAI-compatible chat-completions client implementing
//!   [`TextUnderstanding`](schedule_engine::extractor::TextUnderstanding)
//! - [`transcription`] — token-authenticated speech/OCR backend implementing
//!   [`TranscriptionBackend`](schedule_engine::transcription::TranscriptionBackend)
//! - [`config`] — endpoints and credentials from the `[remote]` settings section
//! - [`error`] — `RemoteError` and its mapping onto engine errors

pub mod chat;
pub mod config;
pub mod error;
pub mod transcription;

pub use chat::ChatCompletionClient;
pub use config::RemoteSettings;
pub use error::RemoteError;
pub use transcription::HttpTranscriptionBackend;
