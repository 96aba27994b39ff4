//! Engine settings: built-in defaults, an optional TOML file, then
//! `SCHEDULE_*` environment variables (`__` separates sections, e.g.
//! `SCHEDULE_EXTRACTION__MAX_DAYS=90`).

use std::path::Path;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::derivation::DerivationSettings;
use crate::dst::DstPolicy;
use crate::error::{EngineError, Result};
use crate::expander::ExpansionPolicy;
use crate::extractor::ExtractionLimits;
use crate::slots::{hhmm, Routine};
use crate::transcription::TranscriptionSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// IANA zone whose calendar days the engine works in.
    pub timezone: String,
    pub recurrence: RecurrenceSettings,
    pub extraction: ExtractionLimits,
    pub derivation: DerivationSettings,
    pub routine: RoutineSettings,
    pub transcription: TranscriptionSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            recurrence: RecurrenceSettings::default(),
            extraction: ExtractionLimits::default(),
            derivation: DerivationSettings::default(),
            routine: RoutineSettings::default(),
            transcription: TranscriptionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RecurrenceSettings {
    pub horizon_years: u32,
    pub dst_policy: DstPolicy,
}

impl Default for RecurrenceSettings {
    fn default() -> Self {
        Self {
            horizon_years: 5,
            dst_policy: DstPolicy::default(),
        }
    }
}

/// Default routine, as `HH:MM` strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutineSettings {
    pub wake_up: String,
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
    pub bed: String,
}

impl Default for RoutineSettings {
    fn default() -> Self {
        Self {
            wake_up: "07:00".to_string(),
            breakfast: "08:00".to_string(),
            lunch: "12:00".to_string(),
            dinner: "18:00".to_string(),
            bed: "22:00".to_string(),
        }
    }
}

impl RoutineSettings {
    pub fn to_routine(&self) -> Result<Routine> {
        let parse = |raw: &str| hhmm::parse(raw).map_err(EngineError::Config);
        let routine = Routine {
            wake_up_time: parse(&self.wake_up)?,
            breakfast_time: parse(&self.breakfast)?,
            lunch_time: parse(&self.lunch)?,
            dinner_time: parse(&self.dinner)?,
            bed_time: parse(&self.bed)?,
        };
        routine.validate()?;
        Ok(routine)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (required when given) or from an optional
    /// `schedule.toml` in the working directory, then apply environment
    /// overrides.
    ///
    /// # Errors
    /// Returns `EngineError::Config` if a source cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("schedule").required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SCHEDULE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// # Errors
    /// Returns `EngineError::InvalidTimezone` for an unknown IANA name.
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| EngineError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn expansion_policy(&self) -> Result<ExpansionPolicy> {
        Ok(ExpansionPolicy {
            timezone: self.timezone()?,
            horizon_years: self.recurrence.horizon_years,
            dst: self.recurrence.dst_policy,
        })
    }

    pub fn default_routine(&self) -> Result<Routine> {
        self.routine.to_routine()
    }
}
