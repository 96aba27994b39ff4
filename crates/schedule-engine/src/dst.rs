//! DST transition policies for recurring occurrences.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Policy for occurrences whose local wall-clock time does not exist because
/// of a DST gap (e.g., 02:30 on a spring-forward night).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Drop occurrences that fall in the gap.
    Skip,
    /// Move the occurrence to the first valid minute after the gap.
    #[default]
    ShiftForward,
}

/// Resolve a local wall-clock time in `tz` to a UTC instant.
///
/// Ambiguous times (the repeated hour when clocks fall back) resolve to the
/// earlier instant. Nonexistent times follow `policy`; `None` means the
/// occurrence is skipped.
pub fn localize(naive: NaiveDateTime, tz: Tz, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => {
                // Gaps are at most a few hours; walk forward minute by minute.
                let mut candidate = naive;
                for _ in 0..(24 * 60) {
                    candidate += Duration::minutes(1);
                    if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
                        return Some(dt.with_timezone(&Utc));
                    }
                }
                None
            }
        },
    }
}

/// First instant of `date` in `tz`.
///
/// Zones that skip midnight start the day at the first valid minute.
pub fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    localize(naive, tz, DstPolicy::ShiftForward).unwrap_or_else(|| naive.and_utc())
}

/// Last millisecond of `date` in `tz` (local 23:59:59.999).
pub fn local_day_end(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => local_day_start(next, tz) - Duration::milliseconds(1),
        None => date.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::milliseconds(1),
    }
}
