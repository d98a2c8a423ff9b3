//! Post creation and cascaded deletion.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Post, TargetRef};
use crate::error::EngagementError;
use crate::ports::{EngagementStore, GuardStore, RecordStore, StoreTxn};

use super::atomic::{DEFAULT_MAX_COMMIT_ATTEMPTS, run_atomic};

pub struct PostService {
    store: Arc<dyn EngagementStore>,
    max_commit_attempts: u32,
}

impl PostService {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self::with_commit_attempts(store, DEFAULT_MAX_COMMIT_ATTEMPTS)
    }

    pub fn with_commit_attempts(store: Arc<dyn EngagementStore>, max_commit_attempts: u32) -> Self {
        Self {
            store,
            max_commit_attempts,
        }
    }

    /// Create a post.
    pub async fn create_post(
        &self,
        author_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<Post, EngagementError> {
        let title = title.trim().to_string();
        let body = body.trim().to_string();
        if title.is_empty() {
            return Err(EngagementError::Validation(
                "post title must not be empty".to_string(),
            ));
        }
        if body.is_empty() {
            return Err(EngagementError::Validation(
                "post body must not be empty".to_string(),
            ));
        }

        let post = run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                let title = title.clone();
                let body = body.clone();
                Box::pin(async move {
                    let post = Post::new(author_id, title, body);
                    txn.insert_post(post.clone()).await?;
                    Ok(post)
                })
            },
        )
        .await?;

        tracing::debug!(post = %post.id, author = %author_id, "post created");
        Ok(post)
    }

    /// Fetch a post by id.
    pub async fn get_post(&self, post_id: Uuid) -> Result<Post, EngagementError> {
        let mut txn = self.store.begin().await?;
        txn.find_post(post_id)
            .await?
            .ok_or_else(|| EngagementError::not_found(TargetRef::post(post_id)))
    }

    /// Delete a post together with every guard that references it, as one
    /// commit.
    ///
    /// Comments under the post are left in place, pointing at a parent that
    /// no longer exists; callers treat them as orphaned.
    pub async fn delete_post(
        &self,
        post_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Post, EngagementError> {
        let target = TargetRef::post(post_id);

        let post = run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                Box::pin(async move {
                    let post = txn
                        .find_post(post_id)
                        .await?
                        .ok_or_else(|| EngagementError::not_found(target))?;

                    if post.author_id != requester_id {
                        return Err(EngagementError::Forbidden {
                            user_id: requester_id,
                            target,
                        });
                    }

                    txn.remove_post(post_id).await?;
                    txn.purge_guards(target).await?;

                    Ok(post)
                })
            },
        )
        .await?;

        tracing::info!(post = %post_id, "post deleted with its guards");
        Ok(post)
    }
}
