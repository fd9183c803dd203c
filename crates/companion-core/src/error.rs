//! Error types for the DNS companion
//!
//! This module defines all error types used throughout the crate, and the
//! retry classification consulted by the resilience layer.

use thiserror::Error;

/// Result type alias for companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Textual markers that identify a rate-limit condition
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests", "429"];

/// Textual markers that identify a transient server-side condition
const TRANSIENT_MARKERS: &[&str] = &["503", "timeout"];

/// Core error type for the DNS companion
#[derive(Error, Debug)]
pub enum Error {
    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connectivity failures (connection refused, reset, DNS failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote call exceeded its deadline
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Non-success HTTP status from the remote endpoint
    #[error("unexpected HTTP status {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Explicit error status reported by the remote API
    #[error("{action} failed: ({status_code}) '{short_message}' '{long_message}'")]
    Api {
        /// Request action that failed
        action: String,
        /// Remote status code
        status_code: i64,
        /// Short message
        short_message: String,
        /// Long message
        long_message: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The circuit breaker rejected the call without touching the transport
    #[error("circuit breaker open after {attempts} attempts{}", fmt_cause(.last_error))]
    CircuitOpen {
        /// Attempts made before the rejection
        attempts: u32,
        /// Failure observed by the previous attempt, if any
        last_error: Option<Box<Error>>,
    },

    /// Every permitted attempt failed with a retryable error
    #[error("max retries ({max_retries}) exceeded: {source}")]
    RetriesExhausted {
        /// Configured retry count
        max_retries: u32,
        /// Failure of the final attempt
        source: Box<Error>,
    },

    /// The failure was classified as not worth retrying
    #[error("non-retryable failure: {source}")]
    NonRetryable {
        /// Underlying failure
        source: Box<Error>,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn fmt_cause(cause: &Option<Box<Error>>) -> String {
    match cause {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    markers.iter().any(|m| haystack.contains(m))
}

impl Error {
    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether another attempt may succeed.
    ///
    /// Timeouts, connectivity failures, rate limits and transient server
    /// statuses are retryable, as is any message carrying a rate-limit or
    /// timeout marker. Authentication failures, malformed payloads and
    /// explicit API error statuses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Transport(_) | Error::RateLimited(_) => true,
            Error::Http { status, body } => {
                matches!(status, 429 | 502 | 503 | 504)
                    || contains_any(body, RATE_LIMIT_MARKERS)
                    || contains_any(body, TRANSIENT_MARKERS)
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Other(msg) => {
                contains_any(msg, RATE_LIMIT_MARKERS) || contains_any(msg, TRANSIENT_MARKERS)
            }
            _ => false,
        }
    }

    /// Whether the failure is specifically a rate-limit signal
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Error::RateLimited(_) => true,
            Error::Http { status, body } => *status == 429 || contains_any(body, RATE_LIMIT_MARKERS),
            Error::Other(msg) => contains_any(msg, RATE_LIMIT_MARKERS),
            _ => false,
        }
    }

    /// Whether this is the fail-fast circuit-open condition
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
