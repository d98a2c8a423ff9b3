use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::target::TargetRef;

/// Comment entity - attached to a post or to another comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    /// What this comment hangs off. Immutable after creation.
    pub parent: TargetRef,
    pub body: String,
    pub like_count: i64,
    /// Ids of direct replies to this comment.
    pub child_comment_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Create a new comment with generated ID and timestamp.
    pub fn new(author_id: Uuid, parent: TargetRef, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            parent,
            body,
            like_count: 0,
            child_comment_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot this comment for embedding in a post's recent-comments
    /// slice. The snapshot does not track later changes to the live comment.
    pub fn summarize(&self) -> CommentSummary {
        CommentSummary {
            comment_id: self.id,
            created_at: self.created_at,
            body: self.body.clone(),
            like_count: self.like_count,
        }
    }
}

/// Cache entry embedded in `Post::recent_comments`: a point-in-time copy,
/// never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentSummary {
    pub comment_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub like_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_copies_the_comment_at_a_point_in_time() {
        let parent = TargetRef::post(Uuid::new_v4());
        let mut comment = Comment::new(Uuid::new_v4(), parent, "first!".to_string());
        comment.like_count = 3;

        let summary = comment.summarize();
        assert_eq!(summary.comment_id, comment.id);
        assert_eq!(summary.body, "first!");
        assert_eq!(summary.like_count, 3);

        // The snapshot is detached from the live record.
        comment.like_count = 9;
        assert_eq!(summary.like_count, 3);
    }

    #[test]
    fn summary_wire_shape() {
        let comment = Comment::new(
            Uuid::new_v4(),
            TargetRef::post(Uuid::new_v4()),
            "hello".to_string(),
        );
        let value = serde_json::to_value(comment.summarize()).unwrap();

        let object = value.as_object().unwrap();
        for key in ["comment_id", "created_at", "body", "like_count"] {
            assert!(object.contains_key(key), "missing field {key}");
        }
    }
}
