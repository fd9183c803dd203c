//! Configuration types for the DNS companion
//!
//! This module defines all configuration structures consumed by the core.
//! Loading them (environment, files) is the embedding binary's concern.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Main companion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker policy for remote calls
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Persistent state settings
    #[serde(default)]
    pub state: StateConfig,
}

impl CompanionConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.engine.validate()?;
        self.state.validate()?;
        Ok(())
    }
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry (in milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single backoff (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor applied per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Validate the retry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(crate::Error::config(
                "max backoff must not be smaller than initial backoff",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(crate::Error::config("backoff multiplier must be >= 1.0"));
        }
        Ok(())
    }

    /// Initial backoff as a duration
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Maximum backoff as a duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before probing (in seconds)
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Trial calls admitted while half-open; also the successes needed to close
    #[serde(default = "default_half_open_max_requests")]
    pub half_open_max_requests: u32,
}

impl CircuitBreakerConfig {
    /// Validate the circuit breaker configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.failure_threshold == 0 {
            return Err(crate::Error::config("circuit breaker threshold must be > 0"));
        }
        if self.half_open_max_requests == 0 {
            return Err(crate::Error::config(
                "circuit breaker half-open request budget must be > 0",
            ));
        }
        Ok(())
    }

    /// Open timeout as a duration
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            half_open_max_requests: default_half_open_max_requests(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compute and report decisions without mutating remote records
    #[serde(default)]
    pub dry_run: bool,

    /// Address override; takes precedence over address discovery
    #[serde(default)]
    pub host_ip: Option<IpAddr>,

    /// Capacity of the bounded queue feeding live facts to the engine
    #[serde(default = "default_work_queue_capacity")]
    pub work_queue_capacity: usize,

    /// Deadline for a single remote exchange (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.work_queue_capacity == 0 {
            return Err(crate::Error::config("work queue capacity must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(crate::Error::config("request timeout must be > 0"));
        }
        if let Some(ip) = self.host_ip
            && !ip.is_ipv4()
        {
            return Err(crate::Error::config(format!(
                "host address {} is not IPv4; only A records are managed",
                ip
            )));
        }
        Ok(())
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            host_ip: None,
            work_queue_capacity: default_work_queue_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Persistent state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Persist applied records to disk
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the state file
    #[serde(default = "default_state_path")]
    pub path: String,

    /// Run a reconciliation pass before serving facts
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
}

impl StateConfig {
    /// Validate the state configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(crate::Error::config(
                "state file path cannot be empty when persistence is enabled",
            ));
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_state_path(),
            reconcile_on_startup: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_timeout_secs() -> u64 {
    60
}

fn default_half_open_max_requests() -> u32 {
    3
}

fn default_work_queue_capacity() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_state_path() -> String {
    "/data/dns-state.json".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CompanionConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff(), Duration::from_secs(1));
        assert_eq!(config.circuit_breaker.open_timeout(), Duration::from_secs(60));
        assert_eq!(config.engine.work_queue_capacity, 100);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: CompanionConfig =
            serde_json::from_str(r#"{"engine": {"dry_run": true, "host_ip": "203.0.113.5"}}"#)
                .unwrap();
        assert!(config.engine.dry_run);
        assert_eq!(config.engine.host_ip, Some("203.0.113.5".parse().unwrap()));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.state.enabled);
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let retry = RetryConfig {
            initial_backoff_ms: 5000,
            max_backoff_ms: 100,
            ..RetryConfig::default()
        };
        assert!(retry.validate().is_err());
    }

    #[test]
    fn rejects_ipv6_host_override() {
        let engine = EngineConfig {
            host_ip: Some("2001:db8::1".parse().unwrap()),
            ..EngineConfig::default()
        };
        assert!(matches!(engine.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn rejects_zero_threshold() {
        let breaker = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(breaker.validate().is_err());
    }
}
