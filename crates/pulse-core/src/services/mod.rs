//! Coordinator services - compose the guard store, the like counters, and
//! the recent-comments cache through the atomic commit boundary.

mod atomic;

mod comments;

mod likes;

mod posts;

pub use atomic::{DEFAULT_MAX_COMMIT_ATTEMPTS, run_atomic};
pub use comments::{CommentService, RECENT_COMMENTS_LIMIT};
pub use likes::LikeService;
pub use posts::PostService;
