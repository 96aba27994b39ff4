//! Recognized text → daily-repeating dose schedules.
//!
//! The pipeline extracts a [`MedicationIntent`], spreads its doses over the
//! user's routine, and emits one template schedule per dose time, each paired
//! with a daily rule that ends `days` after today. Nothing is written until
//! [`DerivationPipeline::derive_and_store`], which hands the whole regimen to
//! the store as a single all-or-nothing write.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::dst::{localize, DstPolicy};
use crate::error::{EngineError, Result};
use crate::expander::ExpansionPolicy;
use crate::extractor::{IntentExtractor, MedicationIntent, TextUnderstanding};
use crate::model::{CategoryId, RecurrenceDraft, ScheduleDraft, ScheduleRecord, UserId};
use crate::routine::RoutineProvider;
use crate::slots::{distribute, Routine};
use crate::store::ScheduleStore;

/// Fixed attributes of derived dose schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationSettings {
    pub title: String,
    pub category_id: CategoryId,
    pub dose_minutes: u32,
}

impl Default for DerivationSettings {
    fn default() -> Self {
        Self {
            title: "medication".to_string(),
            category_id: 2,
            dose_minutes: 30,
        }
    }
}

/// One dose time: a template schedule and its daily rule, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSchedule {
    pub schedule: ScheduleDraft,
    pub recurring: RecurrenceDraft,
}

/// Build the dose schedules for `intent` starting `today`.
///
/// # Errors
/// Returns `EngineError::Validation` when the routine cannot hold the doses.
pub fn plan_regimen(
    user_id: UserId,
    intent: &MedicationIntent,
    routine: &Routine,
    today: NaiveDate,
    settings: &DerivationSettings,
    policy: &ExpansionPolicy,
) -> Result<Vec<DerivedSchedule>> {
    let times = distribute(routine, intent.times_per_day)?;
    let repeat_end_date = today
        .checked_add_signed(Duration::days(i64::from(intent.days)))
        .ok_or_else(|| EngineError::Validation {
            field: "days",
            message: format!("{} days after {today} is out of range", intent.days),
        })?;
    let dose_length = Duration::minutes(i64::from(settings.dose_minutes));

    times
        .into_iter()
        .map(|time| {
            // A dose never disappears into a DST gap; it moves past it.
            let start = localize(today.and_time(time), policy.timezone, DstPolicy::ShiftForward)
                .ok_or_else(|| EngineError::Validation {
                    field: "routine",
                    message: format!("{time} does not exist on {today}"),
                })?;
            let schedule = ScheduleDraft::new(user_id, start, start + dose_length)
                .with_title(settings.title.clone())
                .with_category(settings.category_id)
                .with_memo(intent.instructions.clone());
            Ok(DerivedSchedule {
                schedule,
                recurring: RecurrenceDraft::daily(1).until(repeat_end_date),
            })
        })
        .collect()
}

/// Extraction → time-slot distribution → regimen synthesis.
pub struct DerivationPipeline<T, R> {
    extractor: IntentExtractor<T>,
    routines: R,
    settings: DerivationSettings,
    policy: ExpansionPolicy,
}

impl<T: TextUnderstanding, R: RoutineProvider> DerivationPipeline<T, R> {
    pub fn new(
        extractor: IntentExtractor<T>,
        routines: R,
        settings: DerivationSettings,
        policy: ExpansionPolicy,
    ) -> Self {
        Self {
            extractor,
            routines,
            settings,
            policy,
        }
    }

    /// Today's date in the configured zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.policy.timezone).date_naive()
    }

    /// Derive the regimen for `raw_text` without persisting it.
    #[instrument(skip(self, raw_text))]
    pub async fn derive(
        &self,
        user_id: UserId,
        raw_text: &str,
        today: NaiveDate,
    ) -> Result<Vec<DerivedSchedule>> {
        let intent = self.extractor.extract(raw_text).await?;
        let routine = self.routines.routine(user_id).await?;
        let derived = plan_regimen(
            user_id,
            &intent,
            &routine,
            today,
            &self.settings,
            &self.policy,
        )?;
        info!(
            times_per_day = intent.times_per_day,
            days = intent.days,
            schedules = derived.len(),
            "derived medication regimen"
        );
        Ok(derived)
    }

    /// Derive the regimen and write every schedule in one transaction.
    pub async fn derive_and_store<S: ScheduleStore + ?Sized>(
        &self,
        store: &S,
        user_id: UserId,
        raw_text: &str,
        today: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>> {
        let derived = self.derive(user_id, raw_text, today).await?;
        let items = derived
            .into_iter()
            .map(|d| Ok((d.schedule.validate(self.policy.timezone)?, d.recurring.validate()?)))
            .collect::<Result<Vec<_>>>()?;
        store.insert_all(items).await
    }
}
