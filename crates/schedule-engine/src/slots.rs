//! Dose time distribution over a user's daily routine.

use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, Result};

/// A user's five daily anchor times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    #[serde(with = "hhmm")]
    pub wake_up_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub breakfast_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub lunch_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub dinner_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub bed_time: NaiveTime,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for Routine {
    /// 07:00 wake, 08:00 breakfast, 12:00 lunch, 18:00 dinner, 22:00 bed.
    fn default() -> Self {
        Self {
            wake_up_time: hm(7, 0),
            breakfast_time: hm(8, 0),
            lunch_time: hm(12, 0),
            dinner_time: hm(18, 0),
            bed_time: hm(22, 0),
        }
    }
}

impl Routine {
    /// Require `wake < breakfast < lunch < dinner < bed`. The anchors are never
    /// reordered.
    ///
    /// # Errors
    /// Returns `EngineError::Validation` naming the first anchor that is not
    /// after its predecessor.
    pub fn validate(&self) -> Result<()> {
        let anchors = [
            ("wake_up_time", self.wake_up_time),
            ("breakfast_time", self.breakfast_time),
            ("lunch_time", self.lunch_time),
            ("dinner_time", self.dinner_time),
            ("bed_time", self.bed_time),
        ];
        for pair in anchors.windows(2) {
            let (prev_name, prev) = pair[0];
            let (name, time) = pair[1];
            if time <= prev {
                return Err(EngineError::Validation {
                    field: name,
                    message: format!(
                        "{} must be after {prev_name} {}",
                        time.format("%H:%M"),
                        prev.format("%H:%M")
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Place `times_per_day` doses on the routine, ascending.
///
/// - 1 dose: lunch.
/// - 2 doses: breakfast, dinner.
/// - 3 doses: breakfast, lunch, dinner.
/// - 4 or more: the wake-to-bed span is cut into `n + 1` equal parts, rounded
///   to the nearest minute, and dose `k` lands at `wake + k * part`. Every
///   dose falls strictly between wake-up and bed time.
///
/// # Errors
/// Returns `EngineError::Validation` when the routine is out of order, when
/// `times_per_day` is zero, or when the span is too short to give every dose
/// its own minute.
pub fn distribute(routine: &Routine, times_per_day: u32) -> Result<Vec<NaiveTime>> {
    routine.validate()?;
    match times_per_day {
        0 => Err(EngineError::Validation {
            field: "times_per_day",
            message: "at least one dose per day is required".to_string(),
        }),
        1 => Ok(vec![routine.lunch_time]),
        2 => Ok(vec![routine.breakfast_time, routine.dinner_time]),
        3 => Ok(vec![
            routine.breakfast_time,
            routine.lunch_time,
            routine.dinner_time,
        ]),
        n => {
            let span = (routine.bed_time - routine.wake_up_time).num_minutes();
            let step = (span as f64 / f64::from(n + 1)).round() as i64;
            // The last dose must stay before bed time.
            if step < 1 || step * i64::from(n) >= span {
                return Err(EngineError::Validation {
                    field: "times_per_day",
                    message: format!("{n} doses do not fit between wake-up and bed time"),
                });
            }
            Ok((1..=i64::from(n))
                .map(|k| truncate_to_minute(routine.wake_up_time + Duration::minutes(k * step)))
                .collect())
        }
    }
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// `HH:MM` (de)serialization for routine anchors. Seconds are accepted on
/// input (`HH:MM:SS`) and dropped on output.
pub mod hhmm {
    use super::*;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Parse `HH:MM` or `HH:MM:SS`.
    pub fn parse(raw: &str) -> std::result::Result<NaiveTime, String> {
        let trimmed = raw.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map_err(|e| format!("invalid clock time '{raw}': {e}"))
    }
}
