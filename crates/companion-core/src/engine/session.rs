//! Scoped DNS sessions
//!
//! [`ScopedSession`] pairs a login with a guaranteed logout. The normal path
//! calls [`ScopedSession::close`]; if the guard is dropped instead (early
//! return, cancelled future) the logout is spawned onto the runtime.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{DnsRecord, ZoneInfo};
use crate::traits::{DnsApi, DnsSession};

/// A logged-in session that is logged out exactly once
pub struct ScopedSession {
    session: Option<Box<dyn DnsSession>>,
    provider: &'static str,
}

impl ScopedSession {
    /// Log in through `api`
    ///
    /// A failed login yields no guard, so there is nothing to clean up.
    pub async fn open(api: &dyn DnsApi) -> Result<Self> {
        let session = api.login().await?;
        debug!(provider = api.provider_name(), "Session opened");
        Ok(Self {
            session: Some(session),
            provider: api.provider_name(),
        })
    }

    fn inner(&mut self) -> Result<&mut Box<dyn DnsSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Other("session already closed".to_string()))
    }

    pub async fn query_zone(&mut self, zone: &str) -> Result<ZoneInfo> {
        self.inner()?.query_zone(zone).await
    }

    pub async fn query_records(&mut self, zone: &str) -> Result<Vec<DnsRecord>> {
        self.inner()?.query_records(zone).await
    }

    pub async fn upsert_records(&mut self, zone: &str, records: &[DnsRecord]) -> Result<Vec<DnsRecord>> {
        self.inner()?.upsert_records(zone, records).await
    }

    /// Log out; failures are logged and swallowed
    pub async fn close(mut self) {
        if let Some(mut session) = self.session.take() {
            match session.logout().await {
                Ok(()) => debug!(provider = self.provider, "Session closed"),
                Err(e) => warn!(provider = self.provider, "Logout failed: {}", e),
            }
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let provider = self.provider;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.logout().await {
                        warn!(provider, "Deferred logout failed: {}", e);
                    }
                });
            }
            Err(_) => warn!(provider, "Session dropped outside a runtime, logout skipped"),
        }
    }
}
