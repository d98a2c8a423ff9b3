//! Ports - trait definitions the store backends must implement.
//! These are the "interfaces" that infrastructure provides to the
//! coordinator services.

mod store;

pub use store::{
    CommentCache, EngagementStore, GuardStore, LikeCounters, RecordStore, StoreTxn,
};
