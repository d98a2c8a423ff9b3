//! # Pulse Core
//!
//! The domain layer of the Pulse engagement backend: the protocol that keeps
//! like counters in lockstep with per-user like records, and a post's
//! denormalized recent-comments slice in lockstep with the live comment set.
//! This crate contains pure business logic with zero infrastructure
//! dependencies; store backends live in `pulse-infra`.

pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

pub use error::EngagementError;
