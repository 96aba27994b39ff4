//! # schedule-engine
//!
//! Recurrence expansion and regimen derivation for a personal/group calendar.
//!
//! The engine turns a schedule template plus a small enumerated repeat rule
//! (daily, weekly, monthly, yearly) and per-occurrence exceptions into concrete
//! occurrences for month, week, and custom windows. It also turns noisy
//! recognized text (OCR of a medication label, speech-to-text) into a set of
//! daily-repeating dose schedules anchored to the user's routine.
//!
//! ## Modules
//!
//! - [`model`] — `Schedule`, `ScheduleRecurring`, `ScheduleInstance` and their drafts/patches
//! - [`expander`] — template + rule + exceptions → occurrences in a window
//! - [`range`] — month / Monday-based week / custom range windows and queries
//! - [`slots`] — dose time distribution over routine anchors
//! - [`extractor`] — recognized text → normalized medication intent
//! - [`derivation`] — intent + routine → daily dose schedules
//! - [`transcription`] — token lifecycle and bounded polling for speech/OCR jobs
//! - [`service`] — create/update/delete and occurrence exceptions
//! - [`store`] — persistence contract and in-memory store
//! - [`routine`] — user routine lookup
//! - [`dst`] — local-time resolution across DST transitions
//! - [`config`] — settings loading
//! - [`error`] — Error types

pub mod config;
pub mod derivation;
pub mod dst;
pub mod error;
pub mod expander;
pub mod extractor;
pub mod model;
pub mod range;
pub mod routine;
pub mod service;
pub mod slots;
pub mod store;
pub mod transcription;

pub use config::Settings;
pub use derivation::{plan_regimen, DerivationPipeline, DerivationSettings, DerivedSchedule};
pub use error::EngineError;
pub use expander::{expand, expand_all, expand_record, ExpansionPolicy, Occurrence};
pub use extractor::{IntentExtractor, MedicationIntent, TextUnderstanding};
pub use model::{
    RecurrenceDraft, RepeatKind, Schedule, ScheduleDraft, ScheduleInstance, ScheduleRecord,
    ScheduleRecurring, Window,
};
pub use range::{date_range_window, month_window, week_window, RangeQuery};
pub use slots::{distribute, Routine};
pub use store::{MemoryStore, ScheduleStore};
