//! Schedule, recurrence rule, and per-occurrence exception records.
//!
//! These are plain data records. Write-time invariants live on the draft and
//! patch types (`ScheduleDraft`, `RecurrenceDraft`, ...); the expander re-checks
//! rule shape at read time so rows that slipped past validation still degrade
//! to a single occurrence instead of failing a query.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{local_day_end, local_day_start};
use crate::error::{EngineError, Result};

pub type ScheduleId = i64;
pub type UserId = i64;
pub type CategoryId = i64;

/// Category assigned when the caller does not pick one.
pub const UNCATEGORIZED: CategoryId = 1;

/// Title assigned when the caller does not provide one.
pub const DEFAULT_TITLE: &str = "new schedule";

/// One logical calendar event. With a [`ScheduleRecurring`] attached it is the
/// template occurrence: its own start/end are the first occurrence of the rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub user_id: UserId,
    pub category_id: CategoryId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub place: String,
    pub memo: String,
    pub is_group: bool,
    pub is_all_day: bool,
}

fn default_category() -> CategoryId {
    UNCATEGORIZED
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// A schedule that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub user_id: UserId,
    #[serde(default = "default_category")]
    pub category_id: CategoryId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_all_day: bool,
}

impl ScheduleDraft {
    pub fn new(user_id: UserId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            user_id,
            category_id: UNCATEGORIZED,
            start,
            end,
            title: default_title(),
            place: String::new(),
            memo: String::new(),
            is_group: false,
            is_all_day: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = category_id;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn all_day(mut self) -> Self {
        self.is_all_day = true;
        self
    }

    /// Check `start <= end` and normalize all-day drafts to the local
    /// start-of-day / end-of-day of their calendar days in `tz`.
    ///
    /// # Errors
    /// Returns `EngineError::Validation` naming `end` when it precedes `start`.
    pub fn validate(mut self, tz: Tz) -> Result<Self> {
        if self.is_all_day {
            let start_day = self.start.with_timezone(&tz).date_naive();
            let end_day = self.end.with_timezone(&tz).date_naive();
            self.start = local_day_start(start_day, tz);
            self.end = local_day_end(end_day, tz);
        }
        if self.start > self.end {
            return Err(EngineError::validation(
                "end",
                format!("end {} is before start {}", self.end, self.start),
            ));
        }
        Ok(self)
    }

    pub fn into_schedule(self, id: ScheduleId) -> Schedule {
        Schedule {
            id,
            user_id: self.user_id,
            category_id: self.category_id,
            start: self.start,
            end: self.end,
            title: self.title,
            place: self.place,
            memo: self.memo,
            is_group: self.is_group,
            is_all_day: self.is_all_day,
        }
    }
}

/// Partial update for a [`Schedule`]; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePatch {
    pub category_id: Option<CategoryId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub place: Option<String>,
    pub memo: Option<String>,
    pub is_group: Option<bool>,
    pub is_all_day: Option<bool>,
}

impl Schedule {
    /// Merge `patch` into a copy of this schedule and re-validate it.
    pub fn apply(&self, patch: SchedulePatch, tz: Tz) -> Result<Schedule> {
        let merged = ScheduleDraft {
            user_id: self.user_id,
            category_id: patch.category_id.unwrap_or(self.category_id),
            start: patch.start.unwrap_or(self.start),
            end: patch.end.unwrap_or(self.end),
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            place: patch.place.unwrap_or_else(|| self.place.clone()),
            memo: patch.memo.unwrap_or_else(|| self.memo.clone()),
            is_group: patch.is_group.unwrap_or(self.is_group),
            is_all_day: patch.is_all_day.unwrap_or(self.is_all_day),
        };
        Ok(merged.validate(tz)?.into_schedule(self.id))
    }
}

/// How a recurring schedule repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

fn default_interval() -> u32 {
    1
}

/// Recurrence rule owned by exactly one schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecurring {
    pub schedule_id: ScheduleId,
    pub repeat_kind: RepeatKind,
    /// Last date (inclusive, local calendar day) a candidate may fall on.
    #[serde(default)]
    pub repeat_end_date: Option<NaiveDate>,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekday ordinals, 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub weekdays: BTreeSet<u8>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub month_of_year: Option<u32>,
}

/// A recurrence rule that has not been attached to a schedule yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceDraft {
    pub repeat_kind: RepeatKind,
    #[serde(default)]
    pub repeat_end_date: Option<NaiveDate>,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub weekdays: BTreeSet<u8>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub month_of_year: Option<u32>,
}

impl Default for RecurrenceDraft {
    /// Kind `none`: no repetition.
    fn default() -> Self {
        Self {
            repeat_kind: RepeatKind::None,
            ..Self::daily(1)
        }
    }
}

impl RecurrenceDraft {
    pub fn daily(interval: u32) -> Self {
        Self {
            repeat_kind: RepeatKind::Daily,
            repeat_end_date: None,
            interval,
            weekdays: BTreeSet::new(),
            day_of_month: None,
            month_of_year: None,
        }
    }

    pub fn weekly(interval: u32, weekdays: impl IntoIterator<Item = u8>) -> Self {
        Self {
            repeat_kind: RepeatKind::Weekly,
            weekdays: weekdays.into_iter().collect(),
            ..Self::daily(interval)
        }
    }

    pub fn monthly(interval: u32, day_of_month: u32) -> Self {
        Self {
            repeat_kind: RepeatKind::Monthly,
            day_of_month: Some(day_of_month),
            ..Self::daily(interval)
        }
    }

    pub fn yearly(interval: u32, month_of_year: u32) -> Self {
        Self {
            repeat_kind: RepeatKind::Yearly,
            month_of_year: Some(month_of_year),
            ..Self::daily(interval)
        }
    }

    pub fn until(mut self, repeat_end_date: NaiveDate) -> Self {
        self.repeat_end_date = Some(repeat_end_date);
        self
    }

    /// Validate the rule shape. Returns `Ok(None)` for `RepeatKind::None`:
    /// a non-recurring schedule is represented by the absence of a rule row.
    ///
    /// # Errors
    /// Returns `EngineError::Validation` naming the offending field.
    pub fn validate(self) -> Result<Option<Self>> {
        if self.repeat_kind == RepeatKind::None {
            return Ok(None);
        }
        if self.interval == 0 {
            return Err(EngineError::validation("interval", "must be at least 1"));
        }
        if let Some(bad) = self.weekdays.iter().find(|d| **d > 6) {
            return Err(EngineError::validation(
                "weekdays",
                format!("weekday ordinal {bad} is outside 0..=6"),
            ));
        }
        match self.repeat_kind {
            RepeatKind::Weekly if self.weekdays.is_empty() => {
                return Err(EngineError::validation(
                    "weekdays",
                    "weekly repetition needs at least one weekday",
                ));
            }
            RepeatKind::Monthly => match self.day_of_month {
                Some(day) if (1..=31).contains(&day) => {}
                Some(day) => {
                    return Err(EngineError::validation(
                        "day_of_month",
                        format!("{day} is outside 1..=31"),
                    ));
                }
                None => {
                    return Err(EngineError::validation(
                        "day_of_month",
                        "monthly repetition needs a day of month",
                    ));
                }
            },
            RepeatKind::Yearly => match self.month_of_year {
                Some(month) if (1..=12).contains(&month) => {}
                Some(month) => {
                    return Err(EngineError::validation(
                        "month_of_year",
                        format!("{month} is outside 1..=12"),
                    ));
                }
                None => {
                    return Err(EngineError::validation(
                        "month_of_year",
                        "yearly repetition needs a month of year",
                    ));
                }
            },
            _ => {}
        }
        Ok(Some(self))
    }

    pub fn into_rule(self, schedule_id: ScheduleId) -> ScheduleRecurring {
        ScheduleRecurring {
            schedule_id,
            repeat_kind: self.repeat_kind,
            repeat_end_date: self.repeat_end_date,
            interval: self.interval,
            weekdays: self.weekdays,
            day_of_month: self.day_of_month,
            month_of_year: self.month_of_year,
        }
    }
}

/// Partial update for an existing [`ScheduleRecurring`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrencePatch {
    pub repeat_kind: Option<RepeatKind>,
    pub repeat_end_date: Option<NaiveDate>,
    /// Drop the end date, making the rule open-ended.
    pub clear_repeat_end_date: bool,
    pub interval: Option<u32>,
    pub weekdays: Option<BTreeSet<u8>>,
    pub day_of_month: Option<u32>,
    pub month_of_year: Option<u32>,
}

impl ScheduleRecurring {
    fn to_draft(&self) -> RecurrenceDraft {
        RecurrenceDraft {
            repeat_kind: self.repeat_kind,
            repeat_end_date: self.repeat_end_date,
            interval: self.interval,
            weekdays: self.weekdays.clone(),
            day_of_month: self.day_of_month,
            month_of_year: self.month_of_year,
        }
    }

    /// Merge `patch` into this rule. `Ok(None)` means the merged kind is
    /// `none` and the rule row should be removed.
    pub fn apply(&self, patch: RecurrencePatch) -> Result<Option<ScheduleRecurring>> {
        let mut draft = self.to_draft();
        if let Some(kind) = patch.repeat_kind {
            draft.repeat_kind = kind;
        }
        if patch.clear_repeat_end_date {
            draft.repeat_end_date = None;
        } else if let Some(date) = patch.repeat_end_date {
            draft.repeat_end_date = Some(date);
        }
        if let Some(interval) = patch.interval {
            draft.interval = interval;
        }
        if let Some(weekdays) = patch.weekdays {
            draft.weekdays = weekdays;
        }
        if let Some(day) = patch.day_of_month {
            draft.day_of_month = Some(day);
        }
        if let Some(month) = patch.month_of_year {
            draft.month_of_year = Some(month);
        }
        Ok(draft.validate()?.map(|d| d.into_rule(self.schedule_id)))
    }
}

/// Override for one occurrence of a recurring schedule, keyed by
/// `(schedule_id, original_start)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInstance {
    pub schedule_id: ScheduleId,
    pub original_start: DateTime<Utc>,
    pub original_end: DateTime<Utc>,
    #[serde(default)]
    pub is_exception: bool,
    #[serde(default)]
    pub exception_memo: Option<String>,
    #[serde(default)]
    pub override_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub override_end: Option<DateTime<Utc>>,
}

impl ScheduleInstance {
    /// An exception that suppresses the occurrence.
    pub fn cancellation(
        schedule_id: ScheduleId,
        original_start: DateTime<Utc>,
        original_end: DateTime<Utc>,
        memo: Option<String>,
    ) -> Self {
        Self {
            schedule_id,
            original_start,
            original_end,
            is_exception: true,
            exception_memo: memo,
            override_start: None,
            override_end: None,
        }
    }

    /// An exception that moves the occurrence to `[start, end]`.
    ///
    /// # Errors
    /// Returns `EngineError::Validation` when `start > end`.
    pub fn moved(
        schedule_id: ScheduleId,
        original_start: DateTime<Utc>,
        original_end: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        memo: Option<String>,
    ) -> Result<Self> {
        if start > end {
            return Err(EngineError::validation(
                "end",
                format!("moved end {end} is before moved start {start}"),
            ));
        }
        Ok(Self {
            schedule_id,
            original_start,
            original_end,
            is_exception: true,
            exception_memo: memo,
            override_start: Some(start),
            override_end: Some(end),
        })
    }

    pub fn is_cancellation(&self) -> bool {
        self.is_exception && self.override_start.is_none() && self.override_end.is_none()
    }

    /// The interval this occurrence actually occupies after the override.
    pub fn effective_interval(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.override_start.unwrap_or(self.original_start);
        let end = self
            .override_end
            .unwrap_or(start + (self.original_end - self.original_start));
        (start, end.max(start))
    }
}

/// A schedule together with the rows it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub schedule: Schedule,
    #[serde(default)]
    pub recurring: Option<ScheduleRecurring>,
    #[serde(default)]
    pub instances: Vec<ScheduleInstance>,
}

impl ScheduleRecord {
    pub fn single(schedule: Schedule) -> Self {
        Self {
            schedule,
            recurring: None,
            instances: Vec::new(),
        }
    }
}

/// Closed query interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// # Errors
    /// Returns `EngineError::Validation` naming `start` when `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(EngineError::validation(
                "start",
                format!("window start {start} is after window end {end}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Closed overlap test: `start <= window.end && end >= window.start`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}
