//! Recurrence expansion -- turns a schedule template plus its rule and
//! exception rows into concrete occurrences within a query window.
//!
//! Candidate dates are stepped in the configured zone's local calendar, the
//! template's local time-of-day and duration are re-applied to each candidate,
//! and per-occurrence overrides are looked up by `(schedule_id, original_start)`.
//! A rule that fails its shape check degrades to the template alone.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dst::{localize, DstPolicy};
use crate::model::{
    RepeatKind, Schedule, ScheduleId, ScheduleInstance, ScheduleRecord, ScheduleRecurring, Window,
};

/// A single concrete occurrence of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub schedule_id: ScheduleId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Start the rule generated before any override was applied. Together with
    /// `schedule_id` this addresses the occurrence for cancel/move requests.
    pub original_start: DateTime<Utc>,
    pub is_exception: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_memo: Option<String>,
}

/// Knobs that bound and localize expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionPolicy {
    /// Zone whose calendar days the rule steps through.
    pub timezone: Tz,
    /// Open-ended rules never generate past `window.end + horizon_years`.
    pub horizon_years: u32,
    pub dst: DstPolicy,
}

impl Default for ExpansionPolicy {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            horizon_years: 5,
            dst: DstPolicy::default(),
        }
    }
}

impl ExpansionPolicy {
    pub fn in_zone(timezone: Tz) -> Self {
        Self {
            timezone,
            ..Self::default()
        }
    }
}

/// Validated stepping rule. Built from a stored rule at read time.
#[derive(Debug, Clone, PartialEq)]
enum Cadence {
    Daily { interval: i64 },
    /// `offsets` are days after the Sunday that opens each week.
    Weekly { interval: i64, offsets: Vec<i64> },
    Monthly { interval: i64, day: u32 },
    Yearly { interval: i64, month: u32 },
}

impl Cadence {
    /// `None` when the rule is not usable (kind `none`, zero interval, missing
    /// or out-of-range weekday/day/month).
    fn from_rule(rule: &ScheduleRecurring) -> Option<Self> {
        if rule.interval == 0 {
            return None;
        }
        let interval = i64::from(rule.interval);
        match rule.repeat_kind {
            RepeatKind::None => None,
            RepeatKind::Daily => Some(Cadence::Daily { interval }),
            RepeatKind::Weekly => {
                if rule.weekdays.is_empty() || rule.weekdays.iter().any(|d| *d > 6) {
                    return None;
                }
                let offsets = rule.weekdays.iter().map(|d| i64::from(*d)).collect();
                Some(Cadence::Weekly { interval, offsets })
            }
            RepeatKind::Monthly => match rule.day_of_month {
                Some(day) if (1..=31).contains(&day) => Some(Cadence::Monthly { interval, day }),
                _ => None,
            },
            RepeatKind::Yearly => match rule.month_of_year {
                Some(month) if (1..=12).contains(&month) => {
                    Some(Cadence::Yearly { interval, month })
                }
                _ => None,
            },
        }
    }

    /// Index of the period containing `date`, counted from the anchor's period.
    fn period_of(&self, anchor: NaiveDate, date: NaiveDate) -> i64 {
        match self {
            Cadence::Daily { interval } => (date - anchor).num_days().div_euclid(*interval),
            Cadence::Weekly { interval, .. } => {
                (week_start(date) - week_start(anchor))
                    .num_days()
                    .div_euclid(7 * interval)
            }
            Cadence::Monthly { interval, .. } => {
                (month_index(date) - month_index(anchor)).div_euclid(*interval)
            }
            Cadence::Yearly { interval, .. } => {
                i64::from(date.year() - anchor.year()).div_euclid(*interval)
            }
        }
    }

    /// Candidate dates of period `k`, ascending. Empty when the arithmetic
    /// leaves chrono's representable range.
    fn dates_in_period(&self, anchor: NaiveDate, k: i64) -> Vec<NaiveDate> {
        match self {
            Cadence::Daily { interval } => anchor
                .checked_add_signed(Duration::days(k * interval))
                .into_iter()
                .collect(),
            Cadence::Weekly { interval, offsets } => {
                let Some(start) =
                    week_start(anchor).checked_add_signed(Duration::weeks(k * interval))
                else {
                    return Vec::new();
                };
                offsets
                    .iter()
                    .filter_map(|o| start.checked_add_signed(Duration::days(*o)))
                    .collect()
            }
            Cadence::Monthly { interval, day } => {
                let index = month_index(anchor) + k * interval;
                let year = index.div_euclid(12);
                let month = index.rem_euclid(12) + 1;
                match (i32::try_from(year), u32::try_from(month)) {
                    (Ok(year), Ok(month)) => clamped_date(year, month, *day).into_iter().collect(),
                    _ => Vec::new(),
                }
            }
            Cadence::Yearly { interval, month } => {
                let Ok(year) = i32::try_from(i64::from(anchor.year()) + k * interval) else {
                    return Vec::new();
                };
                clamped_date(year, *month, anchor.day()).into_iter().collect()
            }
        }
    }
}

/// The Sunday that opens the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|d| d.day())
}

/// `(year, month, day)` with `day` clamped to the month's last day, so the
/// 31st becomes the 30th in April and Feb 29 becomes Feb 28 off leap years.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
}

/// Raw rule candidate before overrides are applied.
struct Candidate {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Generate rule candidates whose local date lies in `[lower, upper]`,
/// honoring the rule's inclusive end date. The template's own date is always a
/// candidate, with the template's exact start/end.
fn generate(
    schedule: &Schedule,
    cadence: &Cadence,
    repeat_end_date: Option<NaiveDate>,
    lower: NaiveDate,
    upper: NaiveDate,
    policy: &ExpansionPolicy,
) -> Vec<Candidate> {
    let tz = policy.timezone;
    let local_start = schedule.start.with_timezone(&tz);
    let anchor = local_start.date_naive();
    let time_of_day = local_start.time();
    let duration = schedule.end - schedule.start;

    let limit = match repeat_end_date {
        Some(end_date) => upper.min(end_date),
        None => upper,
    };

    let mut dates = BTreeSet::new();
    if anchor >= lower && anchor <= upper {
        dates.insert(anchor);
    }

    let mut k = cadence.period_of(anchor, lower.max(anchor)).max(0);
    loop {
        let period = cadence.dates_in_period(anchor, k);
        match period.first() {
            Some(first) if *first <= limit => {}
            _ => break,
        }
        dates.extend(
            period
                .into_iter()
                .filter(|d| *d >= anchor && *d >= lower && *d <= limit),
        );
        k += 1;
    }

    dates
        .into_iter()
        .filter_map(|date| {
            if date == anchor {
                return Some(Candidate {
                    start: schedule.start,
                    end: schedule.end,
                });
            }
            let start = localize(date.and_time(time_of_day), tz, policy.dst)?;
            Some(Candidate {
                start,
                end: start + duration,
            })
        })
        .collect()
}

fn single(schedule: &Schedule, window: &Window) -> Vec<Occurrence> {
    if window.overlaps(schedule.start, schedule.end) {
        vec![Occurrence {
            schedule_id: schedule.id,
            start: schedule.start,
            end: schedule.end,
            original_start: schedule.start,
            is_exception: false,
            exception_memo: None,
        }]
    } else {
        Vec::new()
    }
}

fn usable_cadence(schedule: &Schedule, rule: Option<&ScheduleRecurring>) -> Option<Cadence> {
    let rule = rule?;
    let cadence = Cadence::from_rule(rule);
    if cadence.is_none() {
        warn!(
            schedule_id = schedule.id,
            repeat_kind = ?rule.repeat_kind,
            "malformed recurrence rule, treating schedule as a single occurrence"
        );
    }
    cadence
}

/// Expand one schedule into the occurrences overlapping `window`, sorted by
/// start.
///
/// - Without a rule (or with a malformed one) the schedule itself is the only
///   occurrence, included iff `[start, end]` overlaps the window.
/// - With a rule, candidates step from the template's local date and stop after
///   `repeat_end_date` (inclusive) or the window's last local date, whichever
///   is earlier. Open-ended rules never step past `horizon_years` after the
///   window end.
/// - Each candidate is looked up in `instances` by its original start: a
///   cancellation drops it, an override replaces its start/end, and overlap is
///   tested on the interval that results.
pub fn expand(
    schedule: &Schedule,
    rule: Option<&ScheduleRecurring>,
    instances: &[ScheduleInstance],
    window: &Window,
    policy: &ExpansionPolicy,
) -> Vec<Occurrence> {
    let Some(cadence) = usable_cadence(schedule, rule) else {
        return single(schedule, window);
    };
    let repeat_end_date = rule.and_then(|r| r.repeat_end_date);
    let tz = policy.timezone;

    let overrides: HashMap<DateTime<Utc>, &ScheduleInstance> = instances
        .iter()
        .filter(|i| i.schedule_id == schedule.id)
        .map(|i| (i.original_start, i))
        .collect();

    let window_first = window.start.with_timezone(&tz).date_naive();
    let window_last = window.end.with_timezone(&tz).date_naive();
    let horizon = window_last
        .checked_add_months(Months::new(policy.horizon_years.saturating_mul(12)))
        .unwrap_or(window_last);

    // An occurrence that starts before the window may still run into it.
    let span_days = (schedule.end - schedule.start).num_days() + 1;
    let mut lower = window_first
        .checked_sub_signed(Duration::days(span_days))
        .unwrap_or(window_first);
    let mut upper = window_last;

    // Moved occurrences can land in the window from candidates outside it.
    for instance in overrides.values().filter(|i| !i.is_cancellation()) {
        let (start, end) = instance.effective_interval();
        if window.overlaps(start, end) {
            let original_date = instance.original_start.with_timezone(&tz).date_naive();
            lower = lower.min(original_date);
            upper = upper.max(original_date.min(horizon));
        }
    }

    let mut occurrences: Vec<Occurrence> =
        generate(schedule, &cadence, repeat_end_date, lower, upper, policy)
            .into_iter()
            .filter_map(|candidate| match overrides.get(&candidate.start) {
                Some(instance) if instance.is_cancellation() => None,
                Some(instance) => {
                    let (start, end) = if instance.override_start.is_some()
                        || instance.override_end.is_some()
                    {
                        instance.effective_interval()
                    } else {
                        (candidate.start, candidate.end)
                    };
                    Some(Occurrence {
                        schedule_id: schedule.id,
                        start,
                        end,
                        original_start: candidate.start,
                        is_exception: instance.is_exception,
                        exception_memo: instance.exception_memo.clone(),
                    })
                }
                None => Some(Occurrence {
                    schedule_id: schedule.id,
                    start: candidate.start,
                    end: candidate.end,
                    original_start: candidate.start,
                    is_exception: false,
                    exception_memo: None,
                }),
            })
            .filter(|o| window.overlaps(o.start, o.end))
            .collect();

    occurrences.sort_by_key(|o| (o.start, o.schedule_id));
    occurrences
}

/// [`expand`] over a [`ScheduleRecord`].
pub fn expand_record(
    record: &ScheduleRecord,
    window: &Window,
    policy: &ExpansionPolicy,
) -> Vec<Occurrence> {
    expand(
        &record.schedule,
        record.recurring.as_ref(),
        &record.instances,
        window,
        policy,
    )
}

/// Expand many schedules into one list ordered by `(start, schedule_id)`.
pub fn expand_all(
    records: &[ScheduleRecord],
    window: &Window,
    policy: &ExpansionPolicy,
) -> Vec<Occurrence> {
    let mut all: Vec<Occurrence> = records
        .iter()
        .flat_map(|record| expand_record(record, window, policy))
        .collect();
    all.sort_by_key(|o| (o.start, o.schedule_id));
    all
}

/// Find the rule candidate that starts exactly at `original_start`.
///
/// Returns the candidate's `(start, end)` before overrides, or `None` when the
/// rule never generates that start. A schedule without a usable rule has only
/// its own start as a candidate.
pub fn find_candidate(
    schedule: &Schedule,
    rule: Option<&ScheduleRecurring>,
    original_start: DateTime<Utc>,
    policy: &ExpansionPolicy,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if original_start == schedule.start {
        return Some((schedule.start, schedule.end));
    }
    let cadence = usable_cadence(schedule, rule)?;
    let date = original_start.with_timezone(&policy.timezone).date_naive();
    generate(
        schedule,
        &cadence,
        rule.and_then(|r| r.repeat_end_date),
        date,
        date,
        policy,
    )
    .into_iter()
    .find(|c| c.start == original_start)
    .map(|c| (c.start, c.end))
}
