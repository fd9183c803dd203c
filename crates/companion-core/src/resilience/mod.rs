//! Resilient execution of remote operations
//!
//! [`ResilientExecutor`] runs one logical remote exchange with a per-attempt
//! deadline, exponential backoff between attempts, and a shared
//! [`CircuitBreaker`] gating every attempt. It knows nothing about what the
//! exchange means; callers pass it a closure producing a fresh attempt.
//!
//! ## Failure Reporting
//!
//! - [`Error::CircuitOpen`]: rejected without touching the transport, never
//!   consumes a retry
//! - [`Error::NonRetryable`]: the first non-retryable failure, returned at once
//! - [`Error::RetriesExhausted`]: the final failure after `max_retries` retries

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CallError, CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default deadline for a single attempt
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry + circuit-breaker wrapper around remote exchanges
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    request_timeout: Duration,
}

impl ResilientExecutor {
    /// Create an executor sharing `breaker` with any other executor built from it
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            policy,
            breaker,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-attempt deadline
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The per-attempt deadline
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The shared circuit breaker
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Execute `attempt` until it succeeds, fails permanently, or retries run out
    ///
    /// `operation` names the exchange in logs. `attempt` is invoked once per
    /// try and must build the complete request every time.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.policy.max_retries;
        let mut last_error: Option<Error> = None;

        for n in 0..=max_retries {
            let deadline = self.request_timeout;
            let outcome = self
                .breaker
                .call(|| {
                    let fut = attempt();
                    async move {
                        match tokio::time::timeout(deadline, fut).await {
                            Ok(result) => result,
                            Err(_) => Err(Error::timeout(format!(
                                "{} exceeded {:?}",
                                operation, deadline
                            ))),
                        }
                    }
                })
                .await;

            let err = match outcome {
                Ok(value) => {
                    if n > 0 {
                        debug!(operation, attempt = n, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(CallError::Rejected) => {
                    warn!(operation, "Circuit breaker open, failing fast");
                    return Err(Error::CircuitOpen {
                        attempts: n,
                        last_error: last_error.map(Box::new),
                    });
                }
                Err(CallError::Failed(err)) => err,
            };

            if !err.is_retryable() {
                debug!(operation, error = %err, "Non-retryable failure");
                return Err(Error::NonRetryable {
                    source: Box::new(err),
                });
            }

            if n >= max_retries {
                last_error = Some(err);
                break;
            }

            let mut backoff = self.policy.backoff(n);
            if err.is_rate_limit() {
                backoff *= 2;
            }

            warn!(
                operation,
                attempt = n,
                error = %err,
                "Remote call failed, retrying in {:?}",
                backoff
            );
            last_error = Some(err);
            tokio::time::sleep(backoff).await;
        }

        Err(Error::RetriesExhausted {
            max_retries,
            source: Box::new(
                last_error.unwrap_or_else(|| Error::Other(format!("{} made no attempt", operation))),
            ),
        })
    }
}
