use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::CommentSummary;

/// Post entity - a top-level piece of content that can be liked and
/// commented on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    /// Kept in lockstep with the per-user like guards; never negative.
    pub like_count: i64,
    /// Denormalized slice of the most recent comments, newest first.
    /// Bounded, and recomputed wholesale whenever the comment set changes.
    pub recent_comments: Vec<CommentSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new post with generated ID and timestamps.
    pub fn new(author_id: Uuid, title: String, body: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id,
            title,
            body,
            like_count: 0,
            recent_comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
