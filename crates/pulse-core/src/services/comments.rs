//! Comment creation and deletion, and the recent-comments cache
//! synchronizer that keeps each post's denormalized slice honest.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Comment, TargetKind, TargetRef};
use crate::error::EngagementError;
use crate::ports::{CommentCache, EngagementStore, GuardStore, RecordStore, StoreTxn};

use super::atomic::{DEFAULT_MAX_COMMIT_ATTEMPTS, run_atomic};

/// How many comments a post's denormalized slice holds.
pub const RECENT_COMMENTS_LIMIT: usize = 10;

pub struct CommentService {
    store: Arc<dyn EngagementStore>,
    max_commit_attempts: u32,
}

impl CommentService {
    pub fn new(store: Arc<dyn EngagementStore>) -> Self {
        Self::with_commit_attempts(store, DEFAULT_MAX_COMMIT_ATTEMPTS)
    }

    pub fn with_commit_attempts(store: Arc<dyn EngagementStore>, max_commit_attempts: u32) -> Self {
        Self {
            store,
            max_commit_attempts,
        }
    }

    /// Create a comment under a post or under another comment.
    ///
    /// When the parent is a post, the post's recent-comments slice is
    /// recomputed in the same commit, so the new comment and its cache entry
    /// appear together or not at all.
    pub async fn create_comment(
        &self,
        author_id: Uuid,
        parent: TargetRef,
        body: &str,
    ) -> Result<Comment, EngagementError> {
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(EngagementError::Validation(
                "comment body must not be empty".to_string(),
            ));
        }

        let comment = run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                let body = body.clone();
                Box::pin(async move {
                    let parent_exists = match parent.kind {
                        TargetKind::Post => txn.find_post(parent.id).await?.is_some(),
                        TargetKind::Comment => txn.find_comment(parent.id).await?.is_some(),
                    };
                    if !parent_exists {
                        return Err(EngagementError::not_found(parent));
                    }

                    let comment = Comment::new(author_id, parent, body);
                    txn.insert_comment(comment.clone()).await?;

                    match parent.kind {
                        TargetKind::Post => refresh_recent_comments(txn, parent.id).await?,
                        TargetKind::Comment => txn.add_child_comment(parent.id, comment.id).await?,
                    }

                    Ok(comment)
                })
            },
        )
        .await?;

        tracing::debug!(comment = %comment.id, parent = %parent, "comment created");
        Ok(comment)
    }

    /// Delete a comment. Only its author may do so.
    ///
    /// Removes the comment, every guard that references it, and its entry in
    /// the parent's bookkeeping; when the parent is a post that still
    /// exists, the recent-comments slice is recomputed. All of it commits as
    /// one unit.
    pub async fn delete_comment(
        &self,
        comment_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Comment, EngagementError> {
        let target = TargetRef::comment(comment_id);

        let comment = run_atomic(
            self.store.as_ref(),
            self.max_commit_attempts,
            |txn: &mut dyn StoreTxn| {
                Box::pin(async move {
                    let comment = txn
                        .find_comment(comment_id)
                        .await?
                        .ok_or_else(|| EngagementError::not_found(target))?;

                    if comment.author_id != requester_id {
                        return Err(EngagementError::Forbidden {
                            user_id: requester_id,
                            target,
                        });
                    }

                    txn.remove_comment(comment_id).await?;
                    txn.purge_guards(target).await?;

                    match comment.parent.kind {
                        // Deleting a comment outside the cached window still
                        // recomputes; the read is fixed-size either way.
                        TargetKind::Post => {
                            if txn.find_post(comment.parent.id).await?.is_some() {
                                refresh_recent_comments(txn, comment.parent.id).await?;
                            }
                        }
                        TargetKind::Comment => {
                            txn.remove_child_comment(comment.parent.id, comment_id).await?;
                        }
                    }

                    Ok(comment)
                })
            },
        )
        .await?;

        tracing::debug!(comment = %comment_id, "comment deleted with its guards");
        Ok(comment)
    }

    /// Fetch a comment by id.
    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Comment, EngagementError> {
        let mut txn = self.store.begin().await?;
        txn.find_comment(comment_id)
            .await?
            .ok_or_else(|| EngagementError::not_found(TargetRef::comment(comment_id)))
    }
}

/// Recompute a post's recent-comments slice wholesale from the live comment
/// set. Replacing the slice outright stays correct under concurrent
/// deletions, where an incremental append could resurrect a just-deleted
/// comment.
async fn refresh_recent_comments(
    txn: &mut dyn StoreTxn,
    post_id: Uuid,
) -> Result<(), EngagementError> {
    let entries = txn.recent_comments(post_id, RECENT_COMMENTS_LIMIT).await?;
    txn.set_recent_comments(post_id, entries).await?;
    Ok(())
}
