//! The reusable atomic-commit helper every coordinator composes.

use futures::future::BoxFuture;

use crate::error::{EngagementError, StoreError};
use crate::ports::{EngagementStore, StoreTxn};

/// How many times a commit that lost to a concurrent commit is retried
/// before the operation surfaces a transient failure.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Run `op` inside one atomic commit boundary.
///
/// The closure stages reads and writes on the boundary; when it returns Ok
/// the boundary is committed. A commit that loses to a concurrent
/// conflicting commit is rerun from a fresh boundary, at most `max_attempts`
/// times in total, then surfaced as [`EngagementError::Transient`]. A
/// closure error aborts immediately: the boundary is dropped uncommitted and
/// nothing it staged is ever visible.
pub async fn run_atomic<T, F>(
    store: &dyn EngagementStore,
    max_attempts: u32,
    op: F,
) -> Result<T, EngagementError>
where
    F: for<'t> Fn(&'t mut dyn StoreTxn) -> BoxFuture<'t, Result<T, EngagementError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let mut txn = store.begin().await?;

        let value = op(&mut *txn).await?;

        match txn.commit().await {
            Ok(()) => return Ok(value),
            Err(StoreError::Conflict) if attempt < max_attempts => {
                tracing::debug!(attempt, "commit conflicted, retrying");
            }
            Err(StoreError::Conflict) => {
                tracing::warn!(attempts = attempt, "commit retry budget exhausted");
                return Err(EngagementError::Transient { attempts: attempt });
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::domain::{Comment, CommentSummary, LikeGuard, Post, TargetRef};
    use crate::error::{EngagementError, StoreError};
    use crate::ports::{
        CommentCache, EngagementStore, GuardStore, LikeCounters, RecordStore, StoreTxn,
    };

    use super::run_atomic;

    /// Store double whose commits fail with `Conflict` a fixed number of
    /// times before succeeding.
    struct FlakyStore {
        conflicts_left: Arc<AtomicU32>,
        begins: Arc<AtomicU32>,
    }

    impl FlakyStore {
        fn conflicting(times: u32) -> Self {
            Self {
                conflicts_left: Arc::new(AtomicU32::new(times)),
                begins: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    struct FlakyTxn {
        conflicts_left: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EngagementStore for FlakyStore {
        async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakyTxn {
                conflicts_left: self.conflicts_left.clone(),
            }))
        }
    }

    #[async_trait]
    impl RecordStore for FlakyTxn {
        async fn find_post(&mut self, _id: Uuid) -> Result<Option<Post>, StoreError> {
            Ok(None)
        }
        async fn insert_post(&mut self, _post: Post) -> Result<(), StoreError> {
            Ok(())
        }
        async fn remove_post(&mut self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn find_comment(&mut self, _id: Uuid) -> Result<Option<Comment>, StoreError> {
            Ok(None)
        }
        async fn insert_comment(&mut self, _comment: Comment) -> Result<(), StoreError> {
            Ok(())
        }
        async fn remove_comment(&mut self, _id: Uuid) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn add_child_comment(
            &mut self,
            _parent_id: Uuid,
            _child_id: Uuid,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn remove_child_comment(
            &mut self,
            _parent_id: Uuid,
            _child_id: Uuid,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl LikeCounters for FlakyTxn {
        async fn incr_likes(&mut self, _target: TargetRef, _delta: i64) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl GuardStore for FlakyTxn {
        async fn insert_guard(&mut self, _guard: LikeGuard) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete_guard(
            &mut self,
            _user_id: Uuid,
            _target: TargetRef,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn purge_guards(&mut self, _target: TargetRef) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn count_guards(&mut self, _target: TargetRef) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn guards_for_target(
            &mut self,
            _target: TargetRef,
        ) -> Result<Vec<LikeGuard>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl CommentCache for FlakyTxn {
        async fn recent_comments(
            &mut self,
            _post_id: Uuid,
            _limit: usize,
        ) -> Result<Vec<CommentSummary>, StoreError> {
            Ok(Vec::new())
        }
        async fn set_recent_comments(
            &mut self,
            _post_id: Uuid,
            _entries: Vec<CommentSummary>,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl StoreTxn for FlakyTxn {
        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn retries_conflicting_commits_until_one_lands() {
        let store = FlakyStore::conflicting(2);

        let result = run_atomic(&store, 5, |txn: &mut dyn StoreTxn| {
            Box::pin(async move {
                txn.incr_likes(TargetRef::post(Uuid::new_v4()), 1).await?;
                Ok(())
            })
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(store.begins.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn bounded_retry_surfaces_transient() {
        let store = FlakyStore::conflicting(u32::MAX);

        let result = run_atomic(&store, 3, |txn: &mut dyn StoreTxn| {
            Box::pin(async move {
                txn.incr_likes(TargetRef::post(Uuid::new_v4()), 1).await?;
                Ok(())
            })
        })
        .await;

        assert!(matches!(
            result,
            Err(EngagementError::Transient { attempts: 3 })
        ));
        assert_eq!(store.begins.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn domain_errors_abort_without_retry() {
        let store = FlakyStore::conflicting(0);

        let result: Result<(), _> = run_atomic(&store, 5, |_txn: &mut dyn StoreTxn| {
            Box::pin(async move { Err(EngagementError::Validation("nope".to_string())) })
        })
        .await;

        assert!(matches!(result, Err(EngagementError::Validation(_))));
        assert_eq!(store.begins.load(Ordering::SeqCst), 1);
    }
}
