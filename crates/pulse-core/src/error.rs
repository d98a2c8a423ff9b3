//! Error types for the engagement layer.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{TargetKind, TargetRef};

/// Engagement errors - the outcomes a coordinator operation can fail with.
///
/// None of these leave any partial effect behind: a failing operation is
/// indistinguishable from one that was never attempted.
#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: TargetKind, id: Uuid },

    #[error("user {user_id} already likes {target}")]
    AlreadyLiked { user_id: Uuid, target: TargetRef },

    #[error("user {user_id} has not liked {target}")]
    NotLiked { user_id: Uuid, target: TargetRef },

    #[error("user {user_id} does not own {target}")]
    Forbidden { user_id: Uuid, target: TargetRef },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("commit conflicted after {attempts} attempts")]
    Transient { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngagementError {
    pub fn not_found(target: TargetRef) -> Self {
        Self::NotFound {
            kind: target.kind,
            id: target.id,
        }
    }
}

/// Store-level errors - failures reported by the commit boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("query execution failed: {0}")]
    Query(String),

    /// A concurrent conflicting commit won; safe to retry from a fresh
    /// boundary.
    #[error("commit lost to a concurrent conflicting commit")]
    Conflict,

    #[error("unique constraint violated: {0}")]
    Duplicate(String),
}
