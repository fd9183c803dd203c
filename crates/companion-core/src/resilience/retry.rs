//! Exponential backoff policy

use std::time::Duration;

use crate::config::RetryConfig;

/// Immutable retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Ceiling for any single backoff
    pub max_backoff: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            multiplier: config.backoff_multiplier,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Backoff after the failed attempt number `attempt` (0-based):
    /// `min(initial * multiplier^attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_backoff.as_secs_f64();

        // NaN and infinity both land on the ceiling.
        if secs.is_finite() && secs < max_secs {
            Duration::from_secs_f64(secs)
        } else {
            self.max_backoff
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
