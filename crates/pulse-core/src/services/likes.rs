//! Like / Unlike coordination.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{LikeGuard, TargetRef};
use crate::error::{EngagementError, StoreError};
use crate::ports::{EngagementStore, GuardStore, LikeCounters, StoreTxn};

use super::atomic::{DEFAULT_MAX_COMMIT_ATTEMPTS, run_atomic};

/// Coordinates the guard store and the like counters so that each user's
/// like is counted exactly once, all-or-nothing.
pub struct LikeService {
    store: Arc<dyn EngagementStore>,
    max_commit_attempts: u32,
}

impl LikeService {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self::with_commit_attempts(store, DEFAULT_MAX_COMMIT_ATTEMPTS)
    }

    pub fn with_commit_attempts(store: Arc<dyn EngagementStore>, max_commit_attempts: u32) -> Self {
        Self {
            store,
            max_commit_attempts,
        }
    }

    /// Like a post or comment on behalf of a user.
    ///
    /// The guard is inserted before the counter moves: a failure between the
    /// two steps can only ever leave an uncommitted guard behind, never a
    /// stray increment. Guard uniqueness is the sole arbiter when a user
    /// races against their own duplicate request.
    pub async fn like(&self, user_id: Uuid, target: TargetRef) -> Result<(), EngagementError> {
        let result = run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                Box::pin(async move {
                    txn.insert_guard(LikeGuard::new(user_id, target)).await?;
                    if !txn.incr_likes(target, 1).await? {
                        return Err(EngagementError::not_found(target));
                    }
                    Ok(())
                })
            },
        )
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(user = %user_id, target = %target, "like recorded");
                Ok(())
            }
            // A duplicate from the same user may only show up at commit time,
            // as a uniqueness violation on the guard key.
            Err(EngagementError::Store(StoreError::Duplicate(_))) => {
                Err(EngagementError::AlreadyLiked { user_id, target })
            }
            Err(err) => Err(err),
        }
    }

    /// Withdraw a user's like.
    ///
    /// The guard is deleted before the counter moves; a duplicate unlike
    /// finds no guard and fails before any decrement, which is what bounds
    /// the counter at zero.
    pub async fn unlike(&self, user_id: Uuid, target: TargetRef) -> Result<(), EngagementError> {
        run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                Box::pin(async move {
                    if !txn.delete_guard(user_id, target).await? {
                        return Err(EngagementError::NotLiked { user_id, target });
                    }
                    if !txn.incr_likes(target, -1).await? {
                        return Err(EngagementError::not_found(target));
                    }
                    Ok(())
                })
            },
        )
        .await?;

        tracing::debug!(user = %user_id, target = %target, "like withdrawn");
        Ok(())
    }
}
