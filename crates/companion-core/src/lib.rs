// # companion-core
//
// Core library of the DNS companion: keeps address records at a
// session-based DNS provider in line with desired-state facts.
//
// ## Architecture Overview
//
// - **DnsApi / DnsSession**: session-oriented access to the DNS provider
// - **ResilientExecutor**: retry, backoff and circuit breaking for remote calls
// - **StateStore**: durable record of what was applied, for drift correction
// - **AddressResolver**: the address records should point at
// - **FactSource**: desired-state facts, one-shot and live
// - **ReconcileEngine**: decides and performs the minimum set of writes
//
// ## Design Principles
//
// 1. **Full desired state**: every write carries the complete record, so
//    retries are safe
// 2. **Fail fast when the provider is down**: one circuit breaker per provider
// 3. **Degrade, don't die**: per-fact and per-entry failures are logged and
//    the companion keeps serving

pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod resilience;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    CircuitBreakerConfig, CompanionConfig, EngineConfig, RetryConfig, StateConfig,
};
pub use engine::{EngineEvent, FactOutcome, ReconcileEngine, ReconcileReport, ScopedSession};
pub use error::{Error, Result};
pub use record::{DnsRecord, HostFact, SyncDecision, ZoneInfo, split_hostname};
pub use resilience::{CircuitBreaker, CircuitState, ResilientExecutor, RetryPolicy};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{AddressResolver, DnsApi, DnsSession, FactSource, Notifier, StateStore};
