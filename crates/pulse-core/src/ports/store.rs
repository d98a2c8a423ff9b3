use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Comment, CommentSummary, LikeGuard, Post, TargetRef};
use crate::error::StoreError;

/// Handle to an engagement store.
///
/// Constructed explicitly at startup and injected into every service; there
/// is no ambient global. Each operation opens its own commit boundary.
#[async_trait]
pub trait EngagementStore: Send + Sync {
    /// Open a new atomic commit boundary.
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError>;
}

/// Post and Comment record access within a commit boundary.
///
/// Reads observe committed state merged with this boundary's own staged
/// writes. Mutations stage; nothing is visible outside until `commit`.
#[async_trait]
pub trait RecordStore: Send {
    async fn find_post(&mut self, id: Uuid) -> Result<Option<Post>, StoreError>;

    async fn insert_post(&mut self, post: Post) -> Result<(), StoreError>;

    /// Remove a post. Returns false if it does not exist.
    async fn remove_post(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>, StoreError>;

    async fn insert_comment(&mut self, comment: Comment) -> Result<(), StoreError>;

    /// Remove a comment. Returns false if it does not exist.
    async fn remove_comment(&mut self, id: Uuid) -> Result<bool, StoreError>;

    /// Record `child_id` as a direct reply of the comment `parent_id`.
    async fn add_child_comment(&mut self, parent_id: Uuid, child_id: Uuid)
    -> Result<(), StoreError>;

    /// Detach `child_id` from the comment `parent_id`. No-op if the parent
    /// is already gone.
    async fn remove_child_comment(
        &mut self,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError>;
}

/// Atomic like-counter arithmetic.
#[async_trait]
pub trait LikeCounters: Send {
    /// Apply `delta` to the target's like counter as store-side arithmetic,
    /// never a read-modify-write computed by the caller. Returns false if
    /// the target does not exist.
    async fn incr_likes(&mut self, target: TargetRef, delta: i64) -> Result<bool, StoreError>;
}

/// The guard store: one idempotency record per (user, target) like.
#[async_trait]
pub trait GuardStore: Send {
    /// Unique-insert. Fails with [`StoreError::Duplicate`] if a guard with
    /// the same (user, target) key is already visible, whether committed or
    /// staged.
    async fn insert_guard(&mut self, guard: LikeGuard) -> Result<(), StoreError>;

    /// Delete-if-exists. Returns whether a guard was there to remove.
    async fn delete_guard(&mut self, user_id: Uuid, target: TargetRef)
    -> Result<bool, StoreError>;

    /// Remove every guard referencing the target. Returns how many were
    /// visible at the time.
    async fn purge_guards(&mut self, target: TargetRef) -> Result<u64, StoreError>;

    /// Number of guards currently referencing the target.
    async fn count_guards(&mut self, target: TargetRef) -> Result<u64, StoreError>;

    /// Every guard currently referencing the target.
    async fn guards_for_target(&mut self, target: TargetRef)
    -> Result<Vec<LikeGuard>, StoreError>;
}

/// The denormalized recent-comments slice kept on each post.
#[async_trait]
pub trait CommentCache: Send {
    /// Read the `limit` most recent live comments directly under a post,
    /// newest first, including comments staged in this boundary.
    async fn recent_comments(
        &mut self,
        post_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CommentSummary>, StoreError>;

    /// Replace a post's cached slice wholesale.
    async fn set_recent_comments(
        &mut self,
        post_id: Uuid,
        entries: Vec<CommentSummary>,
    ) -> Result<(), StoreError>;
}

/// One open atomic commit boundary.
///
/// Every staged mutation becomes visible together on `commit`, or not at
/// all when the boundary is dropped without committing.
#[async_trait]
pub trait StoreTxn: RecordStore + LikeCounters + GuardStore + CommentCache + Send {
    /// Validate the staged mutations against committed state and apply them
    /// as one unit. [`StoreError::Conflict`] means a concurrent commit won;
    /// the whole boundary is safe to retry from scratch.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
