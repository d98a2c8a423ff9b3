//! Versioned in-memory engagement store.
//!
//! The default backend: multi-record atomic commits with optimistic conflict
//! detection, no external process required. A commit boundary stages its
//! operations locally; `commit` validates the whole batch against committed
//! state under the write lock and only then applies it, so every commit is
//! all-or-nothing and a lost race surfaces as [`StoreError::Conflict`].
//!
//! Counter increments are blind arithmetic and never conflict with each
//! other, which is what lets N concurrent likes from distinct users all land
//! without lost updates. Cache replaces validate the per-post comment-set
//! revision they were computed from, so a recompute can never publish a
//! slice derived from a set that has since changed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use pulse_core::domain::{
    Comment, CommentSummary, GuardKey, LikeGuard, Post, TargetKind, TargetRef,
};
use pulse_core::error::StoreError;
use pulse_core::ports::{
    CommentCache, EngagementStore, GuardStore, LikeCounters, RecordStore, StoreTxn,
};

/// Committed state behind the store handle.
#[derive(Default)]
struct State {
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
    guards: HashMap<GuardKey, LikeGuard>,
    /// Revision of each post's live comment set, bumped on every insert or
    /// removal of a direct post comment. Cache replaces validate against
    /// the revision they were read at.
    comment_revs: HashMap<Uuid, u64>,
}

/// In-memory engagement store.
///
/// Note: data does not outlive the process. The handle is cheap to clone
/// and safe to share across tasks.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Open a fresh, empty store.
    pub fn open() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Release the handle. The in-memory backend has nothing to flush; this
    /// keeps the open/close lifecycle uniform with other backends.
    pub async fn close(self) {
        let state = self.state.read().await;
        tracing::info!(
            posts = state.posts.len(),
            comments = state.comments.len(),
            guards = state.guards.len(),
            "memory store closed"
        );
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::open()
    }
}

#[async_trait]
impl EngagementStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
        Ok(Box::new(MemoryTxn {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
            observed_revs: HashMap::new(),
        }))
    }
}

/// A single staged operation inside a commit boundary.
enum StagedOp {
    InsertPost(Post),
    RemovePost(Uuid),
    InsertComment(Comment),
    RemoveComment(Uuid),
    AddChildComment { parent_id: Uuid, child_id: Uuid },
    RemoveChildComment { parent_id: Uuid, child_id: Uuid },
    IncrLikes { target: TargetRef, delta: i64 },
    InsertGuard(LikeGuard),
    DeleteGuard(GuardKey),
    PurgeGuards(TargetRef),
    SetRecentComments {
        post_id: Uuid,
        entries: Vec<CommentSummary>,
        observed_rev: u64,
    },
}

/// One open commit boundary over the memory store.
///
/// Reads observe committed state with this boundary's staged operations
/// overlaid. Dropping the boundary without committing discards everything.
pub struct MemoryTxn {
    state: Arc<RwLock<State>>,
    ops: Vec<StagedOp>,
    /// Comment-set revisions recorded by `recent_comments` reads, consumed
    /// by `set_recent_comments` staging.
    observed_revs: HashMap<Uuid, u64>,
}

impl MemoryTxn {
    /// Committed post with this boundary's staged operations applied.
    fn overlay_post(&self, state: &State, id: Uuid) -> Option<Post> {
        let mut post = state.posts.get(&id).cloned();
        for op in &self.ops {
            match op {
                StagedOp::InsertPost(p) if p.id == id => post = Some(p.clone()),
                StagedOp::RemovePost(pid) if *pid == id => post = None,
                StagedOp::IncrLikes { target, delta }
                    if target.kind == TargetKind::Post && target.id == id =>
                {
                    if let Some(p) = post.as_mut() {
                        p.like_count += delta;
                    }
                }
                StagedOp::SetRecentComments {
                    post_id, entries, ..
                } if *post_id == id => {
                    if let Some(p) = post.as_mut() {
                        p.recent_comments = entries.clone();
                    }
                }
                _ => {}
            }
        }
        post
    }

    /// Committed comment with this boundary's staged operations applied.
    fn overlay_comment(&self, state: &State, id: Uuid) -> Option<Comment> {
        let mut comment = state.comments.get(&id).cloned();
        for op in &self.ops {
            match op {
                StagedOp::InsertComment(c) if c.id == id => comment = Some(c.clone()),
                StagedOp::RemoveComment(cid) if *cid == id => comment = None,
                StagedOp::IncrLikes { target, delta }
                    if target.kind == TargetKind::Comment && target.id == id =>
                {
                    if let Some(c) = comment.as_mut() {
                        c.like_count += delta;
                    }
                }
                StagedOp::AddChildComment {
                    parent_id,
                    child_id,
                } if *parent_id == id => {
                    if let Some(c) = comment.as_mut() {
                        if !c.child_comment_ids.contains(child_id) {
                            c.child_comment_ids.push(*child_id);
                        }
                    }
                }
                StagedOp::RemoveChildComment {
                    parent_id,
                    child_id,
                } if *parent_id == id => {
                    if let Some(c) = comment.as_mut() {
                        c.child_comment_ids.retain(|cid| cid != child_id);
                    }
                }
                _ => {}
            }
        }
        comment
    }

    fn target_visible(&self, state: &State, target: TargetRef) -> bool {
        match target.kind {
            TargetKind::Post => self.overlay_post(state, target.id).is_some(),
            TargetKind::Comment => self.overlay_comment(state, target.id).is_some(),
        }
    }

    /// Guards referencing `target`, committed and staged merged.
    fn visible_guards(&self, state: &State, target: TargetRef) -> Vec<LikeGuard> {
        let mut guards: Vec<LikeGuard> = state
            .guards
            .values()
            .filter(|g| g.target == target)
            .cloned()
            .collect();
        for op in &self.ops {
            match op {
                StagedOp::InsertGuard(g) if g.target == target => guards.push(g.clone()),
                StagedOp::DeleteGuard(key) if key.target == target => {
                    guards.retain(|g| g.key() != *key);
                }
                StagedOp::PurgeGuards(t) if *t == target => guards.clear(),
                _ => {}
            }
        }
        guards
    }

    fn guard_visible(&self, state: &State, key: &GuardKey) -> bool {
        let mut exists = state.guards.contains_key(key);
        for op in &self.ops {
            match op {
                StagedOp::InsertGuard(g) if g.key() == *key => exists = true,
                StagedOp::DeleteGuard(k) if k == key => exists = false,
                StagedOp::PurgeGuards(t) if *t == key.target => exists = false,
                _ => {}
            }
        }
        exists
    }
}

#[async_trait]
impl RecordStore for MemoryTxn {
    async fn find_post(&mut self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let state = self.state.read().await;
        Ok(self.overlay_post(&state, id))
    }

    async fn insert_post(&mut self, post: Post) -> Result<(), StoreError> {
        {
            let state = self.state.read().await;
            if self.overlay_post(&state, post.id).is_some() {
                return Err(StoreError::Duplicate(format!("post {}", post.id)));
            }
        }
        self.ops.push(StagedOp::InsertPost(post));
        Ok(())
    }

    async fn remove_post(&mut self, id: Uuid) -> Result<bool, StoreError> {
        {
            let state = self.state.read().await;
            if self.overlay_post(&state, id).is_none() {
                return Ok(false);
            }
        }
        self.ops.push(StagedOp::RemovePost(id));
        Ok(true)
    }

    async fn find_comment(&mut self, id: Uuid) -> Result<Option<Comment>, StoreError> {
        let state = self.state.read().await;
        Ok(self.overlay_comment(&state, id))
    }

    async fn insert_comment(&mut self, comment: Comment) -> Result<(), StoreError> {
        {
            let state = self.state.read().await;
            if self.overlay_comment(&state, comment.id).is_some() {
                return Err(StoreError::Duplicate(format!("comment {}", comment.id)));
            }
        }
        self.ops.push(StagedOp::InsertComment(comment));
        Ok(())
    }

    async fn remove_comment(&mut self, id: Uuid) -> Result<bool, StoreError> {
        {
            let state = self.state.read().await;
            if self.overlay_comment(&state, id).is_none() {
                return Ok(false);
            }
        }
        self.ops.push(StagedOp::RemoveComment(id));
        Ok(true)
    }

    async fn add_child_comment(
        &mut self,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        self.ops.push(StagedOp::AddChildComment {
            parent_id,
            child_id,
        });
        Ok(())
    }

    async fn remove_child_comment(
        &mut self,
        parent_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), StoreError> {
        self.ops.push(StagedOp::RemoveChildComment {
            parent_id,
            child_id,
        });
        Ok(())
    }
}

#[async_trait]
impl LikeCounters for MemoryTxn {
    async fn incr_likes(&mut self, target: TargetRef, delta: i64) -> Result<bool, StoreError> {
        {
            let state = self.state.read().await;
            if !self.target_visible(&state, target) {
                return Ok(false);
            }
        }
        self.ops.push(StagedOp::IncrLikes { target, delta });
        Ok(true)
    }
}

#[async_trait]
impl GuardStore for MemoryTxn {
    async fn insert_guard(&mut self, guard: LikeGuard) -> Result<(), StoreError> {
        let key = guard.key();
        {
            let state = self.state.read().await;
            if self.guard_visible(&state, &key) {
                return Err(StoreError::Duplicate(format!(
                    "guard for user {} on {}",
                    key.user_id, key.target
                )));
            }
        }
        self.ops.push(StagedOp::InsertGuard(guard));
        Ok(())
    }

    async fn delete_guard(
        &mut self,
        user_id: Uuid,
        target: TargetRef,
    ) -> Result<bool, StoreError> {
        let key = GuardKey { user_id, target };
        {
            let state = self.state.read().await;
            if !self.guard_visible(&state, &key) {
                return Ok(false);
            }
        }
        self.ops.push(StagedOp::DeleteGuard(key));
        Ok(true)
    }

    async fn purge_guards(&mut self, target: TargetRef) -> Result<u64, StoreError> {
        let visible = {
            let state = self.state.read().await;
            self.visible_guards(&state, target).len() as u64
        };
        self.ops.push(StagedOp::PurgeGuards(target));
        Ok(visible)
    }

    async fn count_guards(&mut self, target: TargetRef) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(self.visible_guards(&state, target).len() as u64)
    }

    async fn guards_for_target(
        &mut self,
        target: TargetRef,
    ) -> Result<Vec<LikeGuard>, StoreError> {
        let state = self.state.read().await;
        Ok(self.visible_guards(&state, target))
    }
}

#[async_trait]
impl CommentCache for MemoryTxn {
    async fn recent_comments(
        &mut self,
        post_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CommentSummary>, StoreError> {
        let state = self.state.read().await;
        let parent = TargetRef::post(post_id);

        let mut ids: Vec<Uuid> = state
            .comments
            .values()
            .filter(|c| c.parent == parent)
            .map(|c| c.id)
            .collect();
        for op in &self.ops {
            match op {
                StagedOp::InsertComment(c) if c.parent == parent => ids.push(c.id),
                StagedOp::RemoveComment(id) => ids.retain(|cid| cid != id),
                _ => {}
            }
        }

        let mut live: Vec<Comment> = ids
            .into_iter()
            .filter_map(|id| self.overlay_comment(&state, id))
            .collect();
        // Newest first; ties broken by id so the order is stable.
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        live.truncate(limit);

        let rev = state.comment_revs.get(&post_id).copied().unwrap_or(0);
        self.observed_revs.insert(post_id, rev);

        Ok(live.iter().map(|c| c.summarize()).collect())
    }

    async fn set_recent_comments(
        &mut self,
        post_id: Uuid,
        entries: Vec<CommentSummary>,
    ) -> Result<(), StoreError> {
        let observed_rev = match self.observed_revs.get(&post_id) {
            Some(rev) => *rev,
            None => {
                let state = self.state.read().await;
                state.comment_revs.get(&post_id).copied().unwrap_or(0)
            }
        };
        self.ops.push(StagedOp::SetRecentComments {
            post_id,
            entries,
            observed_rev,
        });
        Ok(())
    }
}

/// Effects of the batch validated so far, so later operations in the same
/// boundary see the earlier ones.
#[derive(Default)]
struct BatchView {
    inserted_posts: HashSet<Uuid>,
    removed_posts: HashSet<Uuid>,
    inserted_comments: HashSet<Uuid>,
    removed_comments: HashSet<Uuid>,
    inserted_guards: HashSet<GuardKey>,
    removed_guards: HashSet<GuardKey>,
    purged_targets: HashSet<TargetRef>,
}

impl BatchView {
    fn post_exists(&self, state: &State, id: Uuid) -> bool {
        if self.removed_posts.contains(&id) {
            return false;
        }
        state.posts.contains_key(&id) || self.inserted_posts.contains(&id)
    }

    fn comment_exists(&self, state: &State, id: Uuid) -> bool {
        if self.removed_comments.contains(&id) {
            return false;
        }
        state.comments.contains_key(&id) || self.inserted_comments.contains(&id)
    }

    fn target_exists(&self, state: &State, target: TargetRef) -> bool {
        match target.kind {
            TargetKind::Post => self.post_exists(state, target.id),
            TargetKind::Comment => self.comment_exists(state, target.id),
        }
    }

    fn guard_exists(&self, state: &State, key: &GuardKey) -> bool {
        if self.inserted_guards.contains(key) {
            return true;
        }
        if self.removed_guards.contains(key) || self.purged_targets.contains(&key.target) {
            return false;
        }
        state.guards.contains_key(key)
    }
}

fn conflict(op: &'static str) -> StoreError {
    tracing::debug!(op, "commit validation failed against committed state");
    StoreError::Conflict
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTxn { state, ops, .. } = *self;
        let mut state = state.write().await;

        // Validate the whole batch before touching anything, so a failed
        // commit leaves committed state untouched.
        let mut seen = BatchView::default();
        for op in &ops {
            match op {
                StagedOp::InsertPost(post) => {
                    if seen.post_exists(&state, post.id) {
                        return Err(StoreError::Duplicate(format!("post {}", post.id)));
                    }
                    seen.inserted_posts.insert(post.id);
                }
                StagedOp::RemovePost(id) => {
                    if !seen.post_exists(&state, *id) {
                        return Err(conflict("remove_post"));
                    }
                    seen.removed_posts.insert(*id);
                }
                StagedOp::InsertComment(comment) => {
                    if seen.comment_exists(&state, comment.id) {
                        return Err(StoreError::Duplicate(format!("comment {}", comment.id)));
                    }
                    if !seen.target_exists(&state, comment.parent) {
                        return Err(conflict("insert_comment"));
                    }
                    seen.inserted_comments.insert(comment.id);
                }
                StagedOp::RemoveComment(id) => {
                    if !seen.comment_exists(&state, *id) {
                        return Err(conflict("remove_comment"));
                    }
                    seen.removed_comments.insert(*id);
                }
                StagedOp::AddChildComment { parent_id, .. } => {
                    if !seen.comment_exists(&state, *parent_id) {
                        return Err(conflict("add_child_comment"));
                    }
                }
                StagedOp::RemoveChildComment { .. } => {}
                StagedOp::IncrLikes { target, .. } => {
                    if !seen.target_exists(&state, *target) {
                        return Err(conflict("incr_likes"));
                    }
                }
                StagedOp::InsertGuard(guard) => {
                    let key = guard.key();
                    if seen.guard_exists(&state, &key) {
                        return Err(StoreError::Duplicate(format!(
                            "guard for user {} on {}",
                            key.user_id, key.target
                        )));
                    }
                    seen.removed_guards.remove(&key);
                    seen.inserted_guards.insert(key);
                }
                StagedOp::DeleteGuard(key) => {
                    if !seen.guard_exists(&state, key) {
                        return Err(conflict("delete_guard"));
                    }
                    if !seen.inserted_guards.remove(key) {
                        seen.removed_guards.insert(*key);
                    }
                }
                StagedOp::PurgeGuards(target) => {
                    seen.inserted_guards.retain(|key| key.target != *target);
                    seen.purged_targets.insert(*target);
                }
                StagedOp::SetRecentComments {
                    post_id,
                    observed_rev,
                    ..
                } => {
                    if !seen.post_exists(&state, *post_id) {
                        return Err(conflict("set_recent_comments"));
                    }
                    let rev = state.comment_revs.get(post_id).copied().unwrap_or(0);
                    if rev != *observed_rev {
                        return Err(conflict("set_recent_comments"));
                    }
                }
            }
        }

        // The batch holds; apply it in order.
        let applied = ops.len();
        for op in ops {
            match op {
                StagedOp::InsertPost(post) => {
                    state.posts.insert(post.id, post);
                }
                StagedOp::RemovePost(id) => {
                    state.posts.remove(&id);
                    state.comment_revs.remove(&id);
                }
                StagedOp::InsertComment(comment) => {
                    if comment.parent.kind == TargetKind::Post {
                        *state.comment_revs.entry(comment.parent.id).or_insert(0) += 1;
                    }
                    state.comments.insert(comment.id, comment);
                }
                StagedOp::RemoveComment(id) => {
                    if let Some(comment) = state.comments.remove(&id) {
                        // Orphaned comments have no cache left to invalidate.
                        if comment.parent.kind == TargetKind::Post
                            && state.posts.contains_key(&comment.parent.id)
                        {
                            *state.comment_revs.entry(comment.parent.id).or_insert(0) += 1;
                        }
                    }
                }
                StagedOp::AddChildComment {
                    parent_id,
                    child_id,
                } => {
                    if let Some(parent) = state.comments.get_mut(&parent_id) {
                        if !parent.child_comment_ids.contains(&child_id) {
                            parent.child_comment_ids.push(child_id);
                        }
                    }
                }
                StagedOp::RemoveChildComment {
                    parent_id,
                    child_id,
                } => {
                    if let Some(parent) = state.comments.get_mut(&parent_id) {
                        parent.child_comment_ids.retain(|id| *id != child_id);
                    }
                }
                StagedOp::IncrLikes { target, delta } => match target.kind {
                    TargetKind::Post => {
                        if let Some(post) = state.posts.get_mut(&target.id) {
                            post.like_count += delta;
                            post.updated_at = Utc::now();
                        }
                    }
                    TargetKind::Comment => {
                        if let Some(comment) = state.comments.get_mut(&target.id) {
                            comment.like_count += delta;
                        }
                    }
                },
                StagedOp::InsertGuard(guard) => {
                    state.guards.insert(guard.key(), guard);
                }
                StagedOp::DeleteGuard(key) => {
                    state.guards.remove(&key);
                }
                StagedOp::PurgeGuards(target) => {
                    state.guards.retain(|key, _| key.target != target);
                }
                StagedOp::SetRecentComments {
                    post_id, entries, ..
                } => {
                    if let Some(post) = state.posts.get_mut(&post_id) {
                        post.recent_comments = entries;
                        post.updated_at = Utc::now();
                    }
                }
            }
        }

        tracing::trace!(ops = applied, "commit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_post(store: &MemoryStore) -> Post {
        let post = Post::new(Uuid::new_v4(), "title".to_string(), "body".to_string());
        let mut txn = store.begin().await.unwrap();
        txn.insert_post(post.clone()).await.unwrap();
        txn.commit().await.unwrap();
        post
    }

    #[tokio::test]
    async fn dropped_boundary_commits_nothing() {
        let store = MemoryStore::open();
        let post = Post::new(Uuid::new_v4(), "title".to_string(), "body".to_string());

        {
            let mut txn = store.begin().await.unwrap();
            txn.insert_post(post.clone()).await.unwrap();
            // Dropped without commit.
        }

        let mut txn = store.begin().await.unwrap();
        assert!(txn.find_post(post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn racing_guard_inserts_surface_as_duplicate_at_commit() {
        let store = MemoryStore::open();
        let post = seeded_post(&store).await;
        let target = TargetRef::post(post.id);
        let user = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_guard(LikeGuard::new(user, target)).await.unwrap();
        second.insert_guard(LikeGuard::new(user, target)).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await.unwrap_err(),
            StoreError::Duplicate(_)
        ));
    }

    #[tokio::test]
    async fn racing_guard_deletes_conflict_instead_of_double_applying() {
        let store = MemoryStore::open();
        let post = seeded_post(&store).await;
        let target = TargetRef::post(post.id);
        let user = Uuid::new_v4();

        let mut setup = store.begin().await.unwrap();
        setup.insert_guard(LikeGuard::new(user, target)).await.unwrap();
        setup.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.delete_guard(user, target).await.unwrap());
        assert!(second.delete_guard(user, target).await.unwrap());

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await.unwrap_err(),
            StoreError::Conflict
        ));
    }

    #[tokio::test]
    async fn stale_cache_recompute_conflicts() {
        let store = MemoryStore::open();
        let post = seeded_post(&store).await;
        let author = Uuid::new_v4();

        let mut stale = store.begin().await.unwrap();
        let entries = stale.recent_comments(post.id, 10).await.unwrap();
        assert!(entries.is_empty());

        // A foreign commit changes the post's comment set in between.
        let mut racer = store.begin().await.unwrap();
        racer
            .insert_comment(Comment::new(author, TargetRef::post(post.id), "hi".to_string()))
            .await
            .unwrap();
        racer.set_recent_comments(post.id, Vec::new()).await.unwrap();
        racer.commit().await.unwrap();

        stale.set_recent_comments(post.id, entries).await.unwrap();
        assert!(matches!(
            stale.commit().await.unwrap_err(),
            StoreError::Conflict
        ));
    }

    #[tokio::test]
    async fn blind_increments_commute() {
        let store = MemoryStore::open();
        let post = seeded_post(&store).await;
        let target = TargetRef::post(post.id);

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.incr_likes(target, 1).await.unwrap());
        assert!(second.incr_likes(target, 1).await.unwrap());

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_post(post.id).await.unwrap().unwrap().like_count, 2);
    }

    #[tokio::test]
    async fn boundary_reads_see_its_own_staged_writes() {
        let store = MemoryStore::open();
        let post = seeded_post(&store).await;
        let author = Uuid::new_v4();

        let mut txn = store.begin().await.unwrap();
        let comment = Comment::new(author, TargetRef::post(post.id), "staged".to_string());
        txn.insert_comment(comment.clone()).await.unwrap();

        let entries = txn.recent_comments(post.id, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].comment_id, comment.id);

        // Not visible to anyone else until commit.
        let mut other = store.begin().await.unwrap();
        assert!(other.recent_comments(post.id, 10).await.unwrap().is_empty());
    }
}
