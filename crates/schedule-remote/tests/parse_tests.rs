//! Tests for provider response parsing.

use chrono::{TimeZone, Utc};
use schedule_engine::transcription::{JobId, JobStatus};
use schedule_remote::chat::{error_message, parse_completion};
use schedule_remote::error::RemoteError;
use schedule_remote::transcription::{parse_job_id, parse_job_status, parse_token};
use serde_json::json;

// ── Chat completions ────────────────────────────────────────────────────────

#[test]
fn completion_content_is_returned() {
    let body = json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": "[{\"intent\":\"a\"}]"}}]
    });
    assert_eq!(parse_completion(&body).unwrap(), "[{\"intent\":\"a\"}]");
}

#[test]
fn content_parts_are_joined() {
    let body = json!({
        "choices": [{"message": {"content": [
            {"type": "text", "text": "[{\"intent\":"},
            {"type": "text", "text": "\"b\"}]"}
        ]}}]
    });
    assert_eq!(parse_completion(&body).unwrap(), "[{\"intent\":\"b\"}]");
}

#[test]
fn missing_choices_is_unexpected() {
    assert!(matches!(
        parse_completion(&json!({"choices": []})),
        Err(RemoteError::UnexpectedResponse(_))
    ));
    assert!(matches!(
        parse_completion(&json!({"choices": [{"message": {"content": null}}]})),
        Err(RemoteError::UnexpectedResponse(_))
    ));
}

#[test]
fn error_messages_are_extracted() {
    assert_eq!(
        error_message(&json!({"error": {"message": "invalid api key", "code": 401}})),
        "invalid api key"
    );
    assert_eq!(error_message(&json!({"error": "rate limited"})), "rate limited");
    assert_eq!(error_message(&json!({"message": "job failed"})), "job failed");
    assert_eq!(error_message(&json!({})), "Unknown error");
}

// ── Transcription ───────────────────────────────────────────────────────────

#[test]
fn token_with_unix_expiry() {
    let token = parse_token(&json!({"access_token": "abc", "expire_at": 1_767_225_600})).unwrap();
    assert_eq!(token.value, "abc");
    assert_eq!(token.expires_at, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
}

#[test]
fn token_without_expiry_is_rejected() {
    assert!(matches!(
        parse_token(&json!({"access_token": "abc"})),
        Err(RemoteError::UnexpectedResponse(_))
    ));
}

#[test]
fn job_ids_may_be_strings_or_numbers() {
    assert_eq!(parse_job_id(&json!({"id": "j-1"})).unwrap(), JobId("j-1".into()));
    assert_eq!(parse_job_id(&json!({"id": 42})).unwrap(), JobId("42".into()));
    assert!(parse_job_id(&json!({})).is_err());
}

#[test]
fn completed_job_joins_utterances() {
    let body = json!({
        "id": "j-1",
        "status": "completed",
        "results": {"utterances": [
            {"start_at": 0, "msg": "amoxicillin one tablet "},
            {"start_at": 1200, "msg": ""},
            {"start_at": 2400, "msg": "twice a day for five days"}
        ]}
    });
    assert_eq!(
        parse_job_status(&body).unwrap(),
        JobStatus::Completed("amoxicillin one tablet twice a day for five days".into())
    );
}

#[test]
fn in_progress_and_failed_jobs() {
    assert_eq!(
        parse_job_status(&json!({"status": "transcribing"})).unwrap(),
        JobStatus::Pending
    );
    assert_eq!(
        parse_job_status(&json!({"status": "failed", "error": {"message": "unsupported codec"}}))
            .unwrap(),
        JobStatus::Failed("unsupported codec".into())
    );
    assert!(parse_job_status(&json!({})).is_err());
}
