//! Recognized text → normalized medication intent.
//!
//! The text-understanding service is asked for one JSON record per medication
//! or instruction it finds. Its reply is parsed leniently: code fences and
//! surrounding prose are tolerated, the records may arrive as a bare array, a
//! single object, or an array nested under any key, field names vary, and
//! counts may be numbers, floats, or strings like `"3 times"`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, Result};

/// System instruction sent with every extraction request.
pub const EXTRACTION_INSTRUCTION: &str = "\
You read text recognized from a medication label, a prescription, or a spoken \
description. For every distinct medication or instruction in the text, emit one \
JSON object with the keys \"intent\" (the medication or task name), \
\"doseDescription\" (amount per dose, e.g. \"1 tablet\"), \"timesPerDay\" \
(integer doses per day) and \"days\" (integer number of days to continue). \
Reply with a JSON array of these objects and nothing else.";

/// External text-understanding service.
#[async_trait]
pub trait TextUnderstanding: Send + Sync {
    /// Run `instruction` over `text` and return the raw reply.
    async fn complete(&self, instruction: &str, text: &str) -> Result<String>;
}

/// One record as extracted, before clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub intent: String,
    pub dose_description: String,
    pub times_per_day: i64,
    pub days: i64,
}

/// Bounds applied to extracted counts. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionLimits {
    pub max_times_per_day: u32,
    pub max_days: u32,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_times_per_day: 24,
            max_days: 365,
        }
    }
}

impl ExtractionLimits {
    pub fn clamp_times_per_day(&self, raw: i64) -> u32 {
        clamp(raw, self.max_times_per_day)
    }

    pub fn clamp_days(&self, raw: i64) -> u32 {
        clamp(raw, self.max_days)
    }
}

fn clamp(raw: i64, max: u32) -> u32 {
    let max = max.max(1);
    u32::try_from(raw.clamp(1, i64::from(max))).unwrap_or(max)
}

/// Combined regimen across every extracted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationIntent {
    /// Distinct intents, comma separated.
    pub title: String,
    /// Highest per-record dose count, so the most frequent item fits.
    pub times_per_day: u32,
    /// Longest per-record duration.
    pub days: u32,
    /// `{intent}: {dose} {times}times {days}days` per record.
    pub instructions: String,
    pub records: Vec<ExtractedRecord>,
}

const INTENT_KEYS: &[&str] = &["intent", "name", "medication", "medicine", "drug", "title"];
const DOSE_KEYS: &[&str] = &[
    "doseDescription",
    "dose_description",
    "dose",
    "dosage",
    "amount",
];
const TIMES_KEYS: &[&str] = &[
    "timesPerDay",
    "times_per_day",
    "times",
    "frequency",
    "perDay",
];
const DAYS_KEYS: &[&str] = &["days", "duration", "durationDays", "duration_days", "period"];

/// Parse every record out of a service reply. Unusable input yields an
/// empty list rather than an error.
pub fn parse_records(reply: &str) -> Vec<ExtractedRecord> {
    let Some(value) = parse_json(reply) else {
        return Vec::new();
    };
    let mut records = Vec::new();
    collect_records(&value, &mut records);
    records
}

/// Locate a JSON document inside `reply`.
fn parse_json(reply: &str) -> Option<Value> {
    let body = strip_fences(reply);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    // Prose around the JSON: take the widest bracketed span.
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(from), Some(to)) = (body.find(open), body.rfind(close)) {
            if from < to {
                if let Ok(value) = serde_json::from_str::<Value>(&body[from..=to]) {
                    return Some(value);
                }
            }
        }
    }
    // One object per line.
    let lines: Vec<Value> = body
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter(Value::is_object)
        .collect();
    (!lines.is_empty()).then_some(Value::Array(lines))
}

fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // Skip a language tag such as "json".
    let after = after.find('\n').map_or(after, |nl| {
        if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
            &after[nl + 1..]
        } else {
            after
        }
    });
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

fn collect_records(value: &Value, out: &mut Vec<ExtractedRecord>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_records(item, out);
            }
        }
        Value::Object(map) => {
            // Records nested in arrays win over the object's own keys, so
            // {"name": "rx", "medications": [...]} yields the medications.
            let before = out.len();
            for child in map.values().filter(|child| child.is_array()) {
                collect_records(child, out);
            }
            if out.len() > before {
                return;
            }
            if let Some(record) = record_from(map) {
                out.push(record);
                return;
            }
            // Keyed wrapper: {"a": {...}, "b": {...}}.
            for child in map.values().filter(|child| child.is_object()) {
                collect_records(child, out);
            }
        }
        _ => {}
    }
}

fn record_from(map: &Map<String, Value>) -> Option<ExtractedRecord> {
    let intent = text_field(map, INTENT_KEYS);
    let dose = text_field(map, DOSE_KEYS);
    let times = number_field(map, TIMES_KEYS);
    let days = number_field(map, DAYS_KEYS);
    if intent.is_none() && times.is_none() && days.is_none() {
        return None;
    }
    Some(ExtractedRecord {
        intent: intent.unwrap_or_else(|| "medication".to_string()),
        dose_description: dose.unwrap_or_default(),
        times_per_day: times.unwrap_or(1),
        days: days.unwrap_or(1),
    })
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        map.get(*key).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    })
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let text = match lookup(map, keys)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn number_field(map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    match lookup(map, keys)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    }
}

/// First run of ASCII digits in `text`, e.g. `"3회"` → 3, `"for 10 days"` → 10.
fn leading_integer(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Combine records into one regimen: max dose count, max duration, and a
/// concatenated instruction line per record.
///
/// # Errors
/// Returns `EngineError::ExtractionFailed` when `records` is empty.
pub fn combine(records: Vec<ExtractedRecord>, limits: &ExtractionLimits) -> Result<MedicationIntent> {
    if records.is_empty() {
        return Err(EngineError::ExtractionFailed(
            "no medication records in the recognized text".to_string(),
        ));
    }

    let mut times_per_day = 1;
    let mut days = 1;
    let mut titles: Vec<&str> = Vec::new();
    let mut lines = Vec::with_capacity(records.len());
    for record in &records {
        let times = limits.clamp_times_per_day(record.times_per_day);
        let record_days = limits.clamp_days(record.days);
        times_per_day = times_per_day.max(times);
        days = days.max(record_days);
        if !titles.contains(&record.intent.as_str()) {
            titles.push(&record.intent);
        }
        let dose = match record.dose_description.trim() {
            "" => String::new(),
            dose => format!("{dose} "),
        };
        lines.push(format!(
            "{}: {dose}{times}times {record_days}days",
            record.intent
        ));
    }

    Ok(MedicationIntent {
        title: titles.join(", "),
        times_per_day,
        days,
        instructions: lines.join(", "),
        records,
    })
}

/// Runs the text-understanding service and normalizes its reply.
pub struct IntentExtractor<T> {
    service: T,
    limits: ExtractionLimits,
}

impl<T: TextUnderstanding> IntentExtractor<T> {
    pub fn new(service: T, limits: ExtractionLimits) -> Self {
        Self { service, limits }
    }

    /// # Errors
    /// Returns `EngineError::ExtractionFailed` when the text is blank or the
    /// reply holds no parseable record; service errors pass through.
    #[instrument(skip_all, fields(text_len = raw_text.len()))]
    pub async fn extract(&self, raw_text: &str) -> Result<MedicationIntent> {
        if raw_text.trim().is_empty() {
            return Err(EngineError::ExtractionFailed(
                "recognized text is empty".to_string(),
            ));
        }
        let reply = self
            .service
            .complete(EXTRACTION_INSTRUCTION, raw_text)
            .await?;
        let records = parse_records(&reply);
        if records.is_empty() {
            warn!(reply_len = reply.len(), "no records in text-understanding reply");
        } else {
            debug!(records = records.len(), "extracted medication records");
        }
        combine(records, &self.limits)
    }
}
