// # DNS API Trait
//
// Defines the interface to a session-oriented DNS management service.
//
// ## Session Lifecycle
//
// ```text
// DnsApi::login ──▶ DnsSession ──▶ query/upsert ... ──▶ DnsSession::logout
// ```
//
// A failed login never yields a session. Once a session exists, the caller
// owns it and must log it out on every exit path. The engine wraps sessions in
// `ScopedSession` for that.
//
// ## Implementations
//
// - Netcup CCP: `companion-provider-netcup` crate

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{DnsRecord, ZoneInfo};

/// Entry point to a DNS management service
///
/// Implementations hold credentials and the shared resilience layer, and
/// hand out one [`DnsSession`] per unit of work.
///
/// # Thread Safety
///
/// Must be `Send + Sync`; a single instance is shared by every worker.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Authenticate and open a new session
    ///
    /// # Returns
    ///
    /// - `Ok(session)`: an authenticated session owned by the caller
    /// - `Err(Error)`: authentication or transport failure; no session exists
    async fn login(&self) -> Result<Box<dyn DnsSession>>;

    /// Provider name used in logs
    fn provider_name(&self) -> &'static str;
}

/// An authenticated session with a DNS management service
#[async_trait]
pub trait DnsSession: Send {
    /// Fetch zone metadata
    ///
    /// Fails with [`crate::Error::NotFound`] when the zone is not part of the
    /// managed account.
    async fn query_zone(&mut self, zone: &str) -> Result<ZoneInfo>;

    /// Fetch the current record set of a zone
    ///
    /// Returns an empty list, never an error, when the zone has no records.
    async fn query_records(&mut self, zone: &str) -> Result<Vec<DnsRecord>>;

    /// Send the full desired state of `records`
    ///
    /// The provider decides how the set merges with existing records; records
    /// not mentioned are left untouched. Returns the record set reported back.
    async fn upsert_records(&mut self, zone: &str, records: &[DnsRecord]) -> Result<Vec<DnsRecord>>;

    /// Update zone metadata (TTL, SOA timers, DNSSEC)
    async fn update_zone(&mut self, zone: &str, info: &ZoneInfo) -> Result<ZoneInfo>;

    /// End the session
    ///
    /// Best-effort. Callers log failures and carry on.
    async fn logout(&mut self) -> Result<()>;
}
