//! User routine lookup.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::UserId;
use crate::slots::Routine;

/// Source of a user's daily routine anchors.
///
/// Implementations return a complete routine for every user, falling back to
/// a default when the user has not configured one.
#[async_trait]
pub trait RoutineProvider: Send + Sync {
    async fn routine(&self, user_id: UserId) -> Result<Routine>;
}

/// Fixed per-user routines with a shared default.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutines {
    default: Routine,
    by_user: HashMap<UserId, Routine>,
}

impl StaticRoutines {
    pub fn new(default: Routine) -> Self {
        Self {
            default,
            by_user: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: UserId, routine: Routine) -> Self {
        self.by_user.insert(user_id, routine);
        self
    }
}

#[async_trait]
impl RoutineProvider for StaticRoutines {
    async fn routine(&self, user_id: UserId) -> Result<Routine> {
        Ok(self.by_user.get(&user_id).copied().unwrap_or(self.default))
    }
}
