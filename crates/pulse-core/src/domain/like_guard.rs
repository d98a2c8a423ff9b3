use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::target::TargetRef;

/// Idempotency record for a single (user, target) like relationship.
///
/// Existence of a guard is the sole source of truth for "this user currently
/// likes this target". A guard is created in the same commit as the counter
/// increment and destroyed in the same commit as the decrement; it has no
/// independent lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeGuard {
    pub user_id: Uuid,
    pub target: TargetRef,
    pub created_at: DateTime<Utc>,
}

impl LikeGuard {
    pub fn new(user_id: Uuid, target: TargetRef) -> Self {
        Self {
            user_id,
            target,
            created_at: Utc::now(),
        }
    }

    /// The unique key the guard store enforces.
    pub fn key(&self) -> GuardKey {
        GuardKey {
            user_id: self.user_id,
            target: self.target,
        }
    }
}

/// Unique (user, target) key of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardKey {
    pub user_id: Uuid,
    pub target: TargetRef,
}
