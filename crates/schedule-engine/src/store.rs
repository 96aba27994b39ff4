//! Persistence contract plus an in-memory implementation.
//!
//! Any backing store works as long as multi-row writes through
//! [`ScheduleStore::insert_all`] are all-or-nothing and deleting a schedule
//! removes its rule and instance rows with it.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::RwLock;

use crate::error::{EngineError, Result};
use crate::model::{
    RecurrenceDraft, Schedule, ScheduleDraft, ScheduleId, ScheduleInstance, ScheduleRecord,
    ScheduleRecurring, UserId, Window,
};

/// Storage operations the engine depends on. Inputs are expected to be
/// validated already; stores only enforce existence and atomicity.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Create every schedule (and its rule, if any) in one transaction.
    /// Either all rows are written or none are.
    async fn insert_all(
        &self,
        items: Vec<(ScheduleDraft, Option<RecurrenceDraft>)>,
    ) -> Result<Vec<ScheduleRecord>>;

    async fn insert(
        &self,
        draft: ScheduleDraft,
        rule: Option<RecurrenceDraft>,
    ) -> Result<ScheduleRecord> {
        self.insert_all(vec![(draft, rule)])
            .await?
            .pop()
            .ok_or_else(|| EngineError::NotFound("inserted schedule".to_string()))
    }

    /// # Errors
    /// Returns `EngineError::NotFound` for an unknown id.
    async fn get(&self, id: ScheduleId) -> Result<ScheduleRecord>;

    /// Replace an existing schedule row.
    async fn save_schedule(&self, schedule: Schedule) -> Result<()>;

    /// Replace the schedule's rule; `None` removes it.
    async fn save_recurrence(
        &self,
        schedule_id: ScheduleId,
        rule: Option<ScheduleRecurring>,
    ) -> Result<()>;

    /// Insert or replace the instance keyed by `(schedule_id, original_start)`.
    async fn save_instance(&self, instance: ScheduleInstance) -> Result<()>;

    /// Returns whether an instance was removed.
    async fn delete_instance(
        &self,
        schedule_id: ScheduleId,
        original_start: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a schedule together with its rule and instances.
    async fn delete(&self, id: ScheduleId) -> Result<()>;

    /// Every schedule of `user_id` that may produce an occurrence in
    /// `window`: single schedules whose interval overlaps it and recurring
    /// schedules whose rule is still running by then. May over-approximate;
    /// the expander does the exact filtering.
    async fn find_in_window(&self, user_id: UserId, window: &Window)
        -> Result<Vec<ScheduleRecord>>;
}

#[derive(Debug, Default)]
struct State {
    next_id: ScheduleId,
    schedules: BTreeMap<ScheduleId, Schedule>,
    rules: HashMap<ScheduleId, ScheduleRecurring>,
    instances: HashMap<ScheduleId, BTreeMap<DateTime<Utc>, ScheduleInstance>>,
}

impl State {
    fn record(&self, schedule: &Schedule) -> ScheduleRecord {
        ScheduleRecord {
            schedule: schedule.clone(),
            recurring: self.rules.get(&schedule.id).cloned(),
            instances: self
                .instances
                .get(&schedule.id)
                .map(|by_start| by_start.values().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn ensure_exists(&self, id: ScheduleId) -> Result<()> {
        if self.schedules.contains_key(&id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("schedule {id}")))
        }
    }
}

/// Conservative check used to prefilter stored schedules for a window.
fn may_touch(record: &ScheduleRecord, window: &Window) -> bool {
    let schedule = &record.schedule;
    if window.overlaps(schedule.start, schedule.end) {
        return true;
    }
    let Some(rule) = &record.recurring else {
        return false;
    };
    let moved_in = record.instances.iter().any(|i| {
        let (start, end) = i.effective_interval();
        !i.is_cancellation() && window.overlaps(start, end)
    });
    if moved_in {
        return true;
    }
    if schedule.start > window.end {
        return false;
    }
    match rule.repeat_end_date {
        None => true,
        Some(last_day) => {
            // Two days of slack covers any zone offset.
            let latest_start = (last_day + Duration::days(2)).and_time(NaiveTime::MIN).and_utc();
            latest_start + (schedule.end - schedule.start) >= window.start
        }
    }
}

/// In-process store guarded by an async `RwLock`. Every write takes the lock
/// once, so a multi-row write is observed entirely or not at all.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    /// Seed the store with existing records, keeping their ids.
    pub fn with_records(records: Vec<ScheduleRecord>) -> Self {
        let mut state = State {
            next_id: 1,
            ..State::default()
        };
        for record in records {
            let id = record.schedule.id;
            state.next_id = state.next_id.max(id + 1);
            if let Some(rule) = record.recurring {
                state.rules.insert(id, ScheduleRecurring { schedule_id: id, ..rule });
            }
            let by_start = state.instances.entry(id).or_default();
            for instance in record.instances {
                by_start.insert(
                    instance.original_start,
                    ScheduleInstance {
                        schedule_id: id,
                        ..instance
                    },
                );
            }
            state.schedules.insert(id, record.schedule);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.schedules.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert_all(
        &self,
        items: Vec<(ScheduleDraft, Option<RecurrenceDraft>)>,
    ) -> Result<Vec<ScheduleRecord>> {
        let mut state = self.state.write().await;
        let mut created = Vec::with_capacity(items.len());
        for (draft, rule) in items {
            let id = state.next_id;
            state.next_id += 1;
            let schedule = draft.into_schedule(id);
            if let Some(rule) = rule {
                state.rules.insert(id, rule.into_rule(id));
            }
            state.schedules.insert(id, schedule.clone());
            created.push(state.record(&schedule));
        }
        Ok(created)
    }

    async fn get(&self, id: ScheduleId) -> Result<ScheduleRecord> {
        let state = self.state.read().await;
        state
            .schedules
            .get(&id)
            .map(|schedule| state.record(schedule))
            .ok_or_else(|| EngineError::NotFound(format!("schedule {id}")))
    }

    async fn save_schedule(&self, schedule: Schedule) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_exists(schedule.id)?;
        state.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn save_recurrence(
        &self,
        schedule_id: ScheduleId,
        rule: Option<ScheduleRecurring>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_exists(schedule_id)?;
        match rule {
            Some(rule) => {
                state.rules.insert(
                    schedule_id,
                    ScheduleRecurring {
                        schedule_id,
                        ..rule
                    },
                );
            }
            None => {
                state.rules.remove(&schedule_id);
            }
        }
        Ok(())
    }

    async fn save_instance(&self, instance: ScheduleInstance) -> Result<()> {
        let mut state = self.state.write().await;
        state.ensure_exists(instance.schedule_id)?;
        state
            .instances
            .entry(instance.schedule_id)
            .or_default()
            .insert(instance.original_start, instance);
        Ok(())
    }

    async fn delete_instance(
        &self,
        schedule_id: ScheduleId,
        original_start: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        state.ensure_exists(schedule_id)?;
        Ok(state
            .instances
            .get_mut(&schedule_id)
            .and_then(|by_start| by_start.remove(&original_start))
            .is_some())
    }

    async fn delete(&self, id: ScheduleId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.schedules.remove(&id).is_none() {
            return Err(EngineError::NotFound(format!("schedule {id}")));
        }
        state.rules.remove(&id);
        state.instances.remove(&id);
        Ok(())
    }

    async fn find_in_window(
        &self,
        user_id: UserId,
        window: &Window,
    ) -> Result<Vec<ScheduleRecord>> {
        let state = self.state.read().await;
        Ok(state
            .schedules
            .values()
            .filter(|s| s.user_id == user_id)
            .map(|s| state.record(s))
            .filter(|record| may_touch(record, window))
            .collect())
    }
}
