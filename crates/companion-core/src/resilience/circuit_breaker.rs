// # Circuit Breaker
//
// Fail-fast gate shared by every caller of one remote dependency.
//
// ## State Machine
//
// ```text
//            threshold failures              timeout elapsed
//  Closed ───────────────────────▶ Open ───────────────────────▶ HalfOpen
//    ▲                              ▲                               │
//    │   max_requests successes     │        any failure            │
//    └──────────────────────────────┼───────────────────────────────┤
//                                   └───────────────────────────────┘
// ```
//
// The lock only guards state inspection and transitions. The protected call
// itself always runs with the lock released.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;

/// Observable circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast
    Open,
    /// A bounded number of trial calls pass through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Outcome of a guarded call that did not produce a value
#[derive(Debug)]
pub enum CallError<E> {
    /// The breaker refused the call; the protected function never ran
    Rejected,
    /// The protected function ran and failed
    Failed(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Trial calls admitted since entering half-open
    half_open_admitted: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding a remote dependency
///
/// Construct one per dependency and share it (behind an `Arc`) with every
/// client that talks to that dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    half_open_max_requests: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker
    ///
    /// # Parameters
    ///
    /// - `threshold`: consecutive failures that open the circuit
    /// - `timeout`: time spent open before probing
    /// - `half_open_max_requests`: trial-call budget, and the successes needed to close
    pub fn new(threshold: u32, timeout: Duration, half_open_max_requests: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            half_open_max_requests: half_open_max_requests.max(1),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_admitted: 0,
                last_failure: None,
            }),
        }
    }

    /// Create a circuit breaker from configuration
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.open_timeout(),
            config.half_open_max_requests,
        )
    }

    /// Current state, applying a pending open → half-open transition
    pub fn state(&self) -> CircuitState {
        let mut guard = self.lock();
        self.maybe_half_open(&mut guard);
        guard.state
    }

    /// Execute `f` under circuit breaker protection
    ///
    /// Returns the payload on success. A rejection is reported separately
    /// from a failure of `f`, and only the latter counts against the circuit.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_admit() {
            return Err(CallError::Rejected);
        }
        let admission = Admission {
            breaker: self,
            settled: false,
        };

        match f().await {
            Ok(value) => {
                admission.succeeded();
                Ok(value)
            }
            Err(err) => {
                admission.failed();
                Err(CallError::Failed(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn maybe_half_open(&self, guard: &mut BreakerState) {
        if guard.state != CircuitState::Open {
            return;
        }
        let elapsed = guard
            .last_failure
            .map(|at| at.elapsed() >= self.timeout)
            .unwrap_or(true);
        if elapsed {
            tracing::info!("Circuit breaker half-open, admitting trial requests");
            guard.state = CircuitState::HalfOpen;
            guard.failure_count = 0;
            guard.success_count = 0;
            guard.half_open_admitted = 0;
        }
    }

    fn try_admit(&self) -> bool {
        let mut guard = self.lock();
        self.maybe_half_open(&mut guard);

        match guard.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if guard.half_open_admitted >= self.half_open_max_requests {
                    false
                } else {
                    guard.half_open_admitted += 1;
                    true
                }
            }
        }
    }

    fn on_success(&self) {
        let mut guard = self.lock();
        match guard.state {
            CircuitState::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.half_open_max_requests {
                    tracing::info!("Circuit breaker closed after successful trial calls");
                    guard.state = CircuitState::Closed;
                    guard.failure_count = 0;
                    guard.success_count = 0;
                    guard.half_open_admitted = 0;
                }
            }
            CircuitState::Closed => {
                guard.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut guard = self.lock();
        guard.failure_count += 1;
        guard.last_failure = Some(Instant::now());

        match guard.state {
            CircuitState::HalfOpen => {
                tracing::warn!("Trial call failed, circuit breaker re-opened");
                guard.state = CircuitState::Open;
                guard.success_count = 0;
            }
            CircuitState::Closed if guard.failure_count >= self.threshold => {
                tracing::warn!(
                    failures = guard.failure_count,
                    "Circuit breaker opened after consecutive failures"
                );
                guard.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    fn on_abandoned(&self) {
        let mut guard = self.lock();
        if guard.state == CircuitState::HalfOpen {
            tracing::warn!("Trial call cancelled before completing, circuit breaker re-opened");
            guard.state = CircuitState::Open;
            guard.last_failure = Some(Instant::now());
            guard.success_count = 0;
        }
    }
}

/// An admitted call that has not reported its outcome yet
///
/// Dropping it unsettled (the caller's future was cancelled) counts as a
/// failed trial call in half-open, so its slot is never lost.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Admission<'_> {
    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    fn failed(mut self) {
        self.settled = true;
        self.breaker.on_failure();
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}
