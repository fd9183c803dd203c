//! Authenticated CCP session
//!
//! Every request carries the session ID from login and the client request
//! ID of the previous response.

use async_trait::async_trait;
use companion_core::record::{DnsRecord, ZoneInfo};
use companion_core::traits::DnsSession;
use companion_core::{Error, Result};
use std::fmt;

use crate::NetcupClient;
use crate::protocol::{
    Action, DOMAIN_NOT_FOUND_STATUS_CODE, Envelope, NO_RECORDS_STATUS_CODE, Params, Request,
    WireRecord, WireRecordSet, WireZone,
};

pub struct NetcupSession {
    client: NetcupClient,
    session_id: String,
    client_request_id: String,
    logged_out: bool,
}

impl fmt::Debug for NetcupSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcupSession")
            .field("session_id", &"<REDACTED>")
            .field("client_request_id", &self.client_request_id)
            .field("logged_out", &self.logged_out)
            .finish()
    }
}

impl NetcupSession {
    pub(crate) fn new(client: NetcupClient, session_id: String, client_request_id: String) -> Self {
        Self {
            client,
            session_id,
            client_request_id,
            logged_out: false,
        }
    }

    /// Client request ID sent with the next request
    pub fn client_request_id(&self) -> &str {
        &self.client_request_id
    }

    /// Send one action; the returned envelope is not status-checked
    async fn exchange(
        &mut self,
        action: Action,
        zone: Option<&str>,
        dns_zone: Option<WireZone>,
        dns_record_set: Option<WireRecordSet>,
    ) -> Result<Envelope> {
        if self.logged_out {
            return Err(Error::Other(format!(
                "{} on a session that was logged out",
                action.as_str()
            )));
        }

        let envelope = {
            let credentials = self.client.credentials();
            let request = Request {
                action,
                param: Params {
                    customer_number: credentials.customer_number,
                    api_key: &credentials.api_key,
                    api_session_id: Some(&self.session_id),
                    client_request_id: &self.client_request_id,
                    domain_name: zone,
                    dns_zone,
                    dns_record_set,
                    ..Params::default()
                },
            };
            if action == Action::Logout {
                self.client.post_once(&request).await?
            } else {
                self.client.post(&request).await?
            }
        };

        // Correlate with the latest response, error statuses included.
        if !envelope.client_request_id.is_empty() {
            self.client_request_id = envelope.client_request_id.clone();
        }
        Ok(envelope)
    }
}

#[async_trait]
impl DnsSession for NetcupSession {
    async fn query_zone(&mut self, zone: &str) -> Result<ZoneInfo> {
        let envelope = self
            .exchange(Action::InfoDnsZone, Some(zone), None, None)
            .await?;
        if envelope.is_error() && envelope.status_code == DOMAIN_NOT_FOUND_STATUS_CODE {
            return Err(Error::not_found(format!(
                "zone {}: {}",
                zone, envelope.short_message
            )));
        }
        envelope.check(Action::InfoDnsZone)?;
        let data: WireZone = envelope.data()?;
        Ok(data.into())
    }

    async fn query_records(&mut self, zone: &str) -> Result<Vec<DnsRecord>> {
        let envelope = self
            .exchange(Action::InfoDnsRecords, Some(zone), None, None)
            .await?;
        if envelope.is_error() && envelope.status_code == NO_RECORDS_STATUS_CODE {
            tracing::debug!(zone, "Zone has no records");
            return Ok(Vec::new());
        }
        envelope.check(Action::InfoDnsRecords)?;
        let data: WireRecordSet = envelope.data()?;
        Ok(data.dns_records.into_iter().map(DnsRecord::from).collect())
    }

    async fn upsert_records(&mut self, zone: &str, records: &[DnsRecord]) -> Result<Vec<DnsRecord>> {
        let record_set = WireRecordSet {
            dns_records: records.iter().map(WireRecord::from).collect(),
        };
        let envelope = self
            .exchange(Action::UpdateDnsRecords, Some(zone), None, Some(record_set))
            .await?;
        envelope.check(Action::UpdateDnsRecords)?;
        let data: WireRecordSet = envelope.data()?;
        Ok(data.dns_records.into_iter().map(DnsRecord::from).collect())
    }

    async fn update_zone(&mut self, zone: &str, info: &ZoneInfo) -> Result<ZoneInfo> {
        let envelope = self
            .exchange(Action::UpdateDnsZone, Some(zone), Some(WireZone::from(info)), None)
            .await?;
        envelope.check(Action::UpdateDnsZone)?;
        let data: WireZone = envelope.data()?;
        Ok(data.into())
    }

    async fn logout(&mut self) -> Result<()> {
        if self.logged_out {
            return Ok(());
        }
        let envelope = self.exchange(Action::Logout, None, None, None).await?;
        self.logged_out = true;
        if envelope.is_error() {
            tracing::debug!(
                status_code = envelope.status_code,
                "Logout reported: {}",
                envelope.short_message
            );
        }
        Ok(())
    }
}
