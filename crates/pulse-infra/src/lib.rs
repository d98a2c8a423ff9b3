//! # Pulse Infrastructure
//!
//! Concrete implementations of the ports defined in `pulse-core`: the
//! engagement store backends, configuration, and the tracing bootstrap.

pub mod config;
pub mod store;
pub mod telemetry;

pub use config::EngagementConfig;
pub use store::MemoryStore;
