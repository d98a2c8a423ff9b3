//! Engagement layer configuration loaded from environment variables.

use std::env;

use pulse_core::services::DEFAULT_MAX_COMMIT_ATTEMPTS;

/// Tuning knobs for the coordinator services.
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// How many times a commit that lost to a concurrent commit is retried
    /// before the operation surfaces a transient failure.
    pub max_commit_attempts: u32,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl EngagementConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_commit_attempts: env::var("PULSE_MAX_COMMIT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_COMMIT_ATTEMPTS),
        }
    }
}
