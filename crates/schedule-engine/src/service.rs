//! Schedule lifecycle: create, update, delete, and per-occurrence exceptions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::{EngineError, Result};
use crate::expander::{find_candidate, ExpansionPolicy};
use crate::model::{
    RecurrenceDraft, RecurrencePatch, Schedule, ScheduleDraft, ScheduleId, ScheduleInstance,
    SchedulePatch, ScheduleRecord, ScheduleRecurring,
};
use crate::store::ScheduleStore;

pub struct ScheduleService<S> {
    store: Arc<S>,
    policy: ExpansionPolicy,
}

impl<S: ScheduleStore> ScheduleService<S> {
    pub fn new(store: Arc<S>, policy: ExpansionPolicy) -> Self {
        Self { store, policy }
    }

    /// Validate and create a schedule with an optional rule in one write.
    /// A rule of kind `none` creates a plain schedule.
    #[instrument(skip_all, fields(user_id = draft.user_id))]
    pub async fn create(
        &self,
        draft: ScheduleDraft,
        rule: Option<RecurrenceDraft>,
    ) -> Result<ScheduleRecord> {
        let draft = draft.validate(self.policy.timezone)?;
        let rule = match rule {
            Some(rule) => rule.validate()?,
            None => None,
        };
        let record = self.store.insert(draft, rule).await?;
        info!(schedule_id = record.schedule.id, "schedule created");
        Ok(record)
    }

    pub async fn get(&self, id: ScheduleId) -> Result<ScheduleRecord> {
        self.store.get(id).await
    }

    /// Merge `patch` into the stored schedule.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: ScheduleId, patch: SchedulePatch) -> Result<Schedule> {
        let record = self.store.get(id).await?;
        let updated = record.schedule.apply(patch, self.policy.timezone)?;
        self.store.save_schedule(updated.clone()).await?;
        Ok(updated)
    }

    /// Replace the schedule's rule. Kind `none` removes it.
    #[instrument(skip(self, rule))]
    pub async fn set_recurrence(
        &self,
        id: ScheduleId,
        rule: RecurrenceDraft,
    ) -> Result<Option<ScheduleRecurring>> {
        let rule = rule.validate()?.map(|r| r.into_rule(id));
        self.store.save_recurrence(id, rule.clone()).await?;
        Ok(rule)
    }

    /// Merge `patch` into the schedule's existing rule.
    ///
    /// # Errors
    /// Returns `EngineError::NotFound` when the schedule has no rule.
    #[instrument(skip(self, patch))]
    pub async fn update_recurrence(
        &self,
        id: ScheduleId,
        patch: RecurrencePatch,
    ) -> Result<Option<ScheduleRecurring>> {
        let record = self.store.get(id).await?;
        let rule = record
            .recurring
            .ok_or_else(|| EngineError::NotFound(format!("recurrence rule of schedule {id}")))?;
        let updated = rule.apply(patch)?;
        self.store.save_recurrence(id, updated.clone()).await?;
        Ok(updated)
    }

    /// Delete the schedule with its rule and exceptions.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ScheduleId) -> Result<()> {
        self.store.delete(id).await?;
        info!("schedule deleted");
        Ok(())
    }

    /// Suppress the occurrence that originally starts at `original_start`.
    #[instrument(skip(self, memo))]
    pub async fn cancel_occurrence(
        &self,
        id: ScheduleId,
        original_start: DateTime<Utc>,
        memo: Option<String>,
    ) -> Result<ScheduleInstance> {
        let (start, end) = self.occurrence_of(id, original_start).await?;
        let instance = ScheduleInstance::cancellation(id, start, end, memo);
        self.store.save_instance(instance.clone()).await?;
        Ok(instance)
    }

    /// Move the occurrence that originally starts at `original_start` to
    /// `[start, end]`.
    #[instrument(skip(self, memo))]
    pub async fn move_occurrence(
        &self,
        id: ScheduleId,
        original_start: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        memo: Option<String>,
    ) -> Result<ScheduleInstance> {
        let (original_start, original_end) = self.occurrence_of(id, original_start).await?;
        let instance =
            ScheduleInstance::moved(id, original_start, original_end, start, end, memo)?;
        self.store.save_instance(instance.clone()).await?;
        Ok(instance)
    }

    /// Drop any override on the occurrence, restoring the rule's version.
    pub async fn restore_occurrence(
        &self,
        id: ScheduleId,
        original_start: DateTime<Utc>,
    ) -> Result<bool> {
        self.store.delete_instance(id, original_start).await
    }

    async fn occurrence_of(
        &self,
        id: ScheduleId,
        original_start: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let record = self.store.get(id).await?;
        find_candidate(
            &record.schedule,
            record.recurring.as_ref(),
            original_start,
            &self.policy,
        )
        .ok_or_else(|| {
            EngineError::NotFound(format!(
                "occurrence of schedule {id} starting at {original_start}"
            ))
        })
    }
}
