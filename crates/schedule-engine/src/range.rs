//! Month, week, and custom date-range queries over stored schedules.
//!
//! Windows are built from local calendar days in the configured zone and are
//! closed: a month window runs from the 1st at 00:00:00.000 through the last
//! day at 23:59:59.999. Weeks start on Monday.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use tracing::{debug, instrument};

use crate::dst::{local_day_end, local_day_start};
use crate::error::{EngineError, Result};
use crate::expander::{expand_all, ExpansionPolicy, Occurrence};
use crate::model::{UserId, Window};
use crate::store::ScheduleStore;

/// Window covering the local days `start_date..=end_date`.
///
/// # Errors
/// Returns `EngineError::Validation` naming `start_date` when it is after
/// `end_date`.
pub fn date_range_window(start_date: NaiveDate, end_date: NaiveDate, tz: Tz) -> Result<Window> {
    if start_date > end_date {
        return Err(EngineError::Validation {
            field: "start_date",
            message: format!("{start_date} is after end date {end_date}"),
        });
    }
    Window::new(local_day_start(start_date, tz), local_day_end(end_date, tz))
}

/// Window covering every day of `year`-`month`: day 1 through day 0 of the
/// following month.
///
/// # Errors
/// Returns `EngineError::Validation` naming `month` when it is outside 1..=12.
pub fn month_window(year: i32, month: u32, tz: Tz) -> Result<Window> {
    let invalid = || EngineError::Validation {
        field: "month",
        message: format!("{year}-{month} is not a calendar month"),
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?;
    let last = next_first.pred_opt().ok_or_else(invalid)?;
    date_range_window(first, last, tz)
}

/// Window covering the Monday-through-Sunday week that contains `date`.
pub fn week_window(date: NaiveDate, tz: Tz) -> Result<Window> {
    let back = i64::from(date.weekday().num_days_from_sunday() + 6) % 7;
    let monday = date - Duration::days(back);
    date_range_window(monday, monday + Duration::days(6), tz)
}

/// Range queries for one backing store.
pub struct RangeQuery<S> {
    store: Arc<S>,
    policy: ExpansionPolicy,
}

impl<S: ScheduleStore> RangeQuery<S> {
    pub fn new(store: Arc<S>, policy: ExpansionPolicy) -> Self {
        Self { store, policy }
    }

    /// Occurrences of `user_id`'s schedules overlapping `window`, sorted by
    /// start then schedule id. An empty result is not an error.
    #[instrument(skip(self), fields(start = %window.start, end = %window.end))]
    pub async fn in_window(&self, user_id: UserId, window: Window) -> Result<Vec<Occurrence>> {
        let records = self.store.find_in_window(user_id, &window).await?;
        let occurrences = expand_all(&records, &window, &self.policy);
        debug!(
            schedules = records.len(),
            occurrences = occurrences.len(),
            "expanded range"
        );
        Ok(occurrences)
    }

    pub async fn in_range(
        &self,
        user_id: UserId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Occurrence>> {
        let window = date_range_window(start_date, end_date, self.policy.timezone)?;
        self.in_window(user_id, window).await
    }

    pub async fn in_month(&self, user_id: UserId, year: i32, month: u32) -> Result<Vec<Occurrence>> {
        let window = month_window(year, month, self.policy.timezone)?;
        self.in_window(user_id, window).await
    }

    pub async fn in_week(&self, user_id: UserId, date: NaiveDate) -> Result<Vec<Occurrence>> {
        let window = week_window(date, self.policy.timezone)?;
        self.in_window(user_id, window).await
    }
}
