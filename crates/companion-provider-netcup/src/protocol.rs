// # CCP JSON Protocol
//
// Wire types of the Netcup CCP DNS API.
//
// ## Request
//
// ```json
// {
//   "action": "infoDnsRecords",
//   "param": {
//     "customernumber": 12345,
//     "apikey": "...",
//     "apisessionid": "...",
//     "clientrequestid": "...",
//     "domainname": "example.com"
//   }
// }
// ```
//
// `login` carries `apipassword` instead of `apisessionid`.
//
// ## Response
//
// ```json
// {
//   "serverrequestid": "...",
//   "clientrequestid": "...",
//   "action": "infoDnsRecords",
//   "status": "success",
//   "statuscode": 2000,
//   "shortmessage": "DNS records found",
//   "longmessage": "...",
//   "responsedata": { "dnsrecords": [ ... ] }
// }
// ```
//
// `responsedata` is an empty string when the action returns nothing.

use companion_core::record::{DnsRecord, ZoneInfo};
use companion_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Production endpoint
pub const DEFAULT_ENDPOINT: &str =
    "https://ccp.netcup.net/run/webservice/servers/endpoint.php?JSON";

/// Status code reported by `infoDnsRecords` for a zone without records
pub const NO_RECORDS_STATUS_CODE: i64 = 5029;

/// Status code reported by `infoDnsZone` for a domain outside the account
pub const DOMAIN_NOT_FOUND_STATUS_CODE: i64 = 5028;

/// API action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Login,
    Logout,
    InfoDnsZone,
    InfoDnsRecords,
    UpdateDnsZone,
    UpdateDnsRecords,
}

impl Action {
    /// Action name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Logout => "logout",
            Action::InfoDnsZone => "infoDnsZone",
            Action::InfoDnsRecords => "infoDnsRecords",
            Action::UpdateDnsZone => "updateDnsZone",
            Action::UpdateDnsRecords => "updateDnsRecords",
        }
    }
}

/// Request body
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub action: Action,
    pub param: Params<'a>,
}

/// Request parameters; absent fields are omitted
#[derive(Debug, Default, Serialize)]
pub struct Params<'a> {
    #[serde(rename = "customernumber")]
    pub customer_number: u64,
    #[serde(rename = "apikey")]
    pub api_key: &'a str,
    #[serde(rename = "apipassword", skip_serializing_if = "Option::is_none")]
    pub api_password: Option<&'a str>,
    #[serde(rename = "apisessionid", skip_serializing_if = "Option::is_none")]
    pub api_session_id: Option<&'a str>,
    #[serde(rename = "clientrequestid")]
    pub client_request_id: &'a str,
    #[serde(rename = "domainname", skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<&'a str>,
    #[serde(rename = "dnszone", skip_serializing_if = "Option::is_none")]
    pub dns_zone: Option<WireZone>,
    #[serde(rename = "dnsrecordset", skip_serializing_if = "Option::is_none")]
    pub dns_record_set: Option<WireRecordSet>,
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Started,
    Pending,
    Warning,
    Unknown,
}

/// Response envelope shared by every action
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default, rename = "serverrequestid")]
    pub server_request_id: String,
    #[serde(default, rename = "clientrequestid")]
    pub client_request_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "statuscode")]
    pub status_code: i64,
    #[serde(default, rename = "shortmessage")]
    pub short_message: String,
    #[serde(default, rename = "longmessage")]
    pub long_message: String,
    #[serde(default, rename = "responsedata")]
    pub response_data: Value,
}

impl Envelope {
    pub fn status(&self) -> Status {
        match self.status.as_str() {
            "success" => Status::Success,
            "error" => Status::Error,
            "started" => Status::Started,
            "pending" => Status::Pending,
            "warning" => Status::Warning,
            _ => Status::Unknown,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status() == Status::Error
    }

    /// Turn an `error` status into [`Error::Api`]
    pub fn check(&self, action: Action) -> Result<()> {
        match self.status() {
            Status::Error => Err(Error::Api {
                action: action.as_str().to_string(),
                status_code: self.status_code,
                short_message: self.short_message.clone(),
                long_message: self.long_message.clone(),
            }),
            Status::Warning => {
                tracing::warn!(
                    action = action.as_str(),
                    status_code = self.status_code,
                    "API warning: {}",
                    self.short_message
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Decode `responsedata`; null or an empty string yields the default
    pub fn data<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match &self.response_data {
            Value::Null => Ok(T::default()),
            Value::String(s) if s.is_empty() => Ok(T::default()),
            value => Ok(serde_json::from_value(value.clone())?),
        }
    }
}

/// `responsedata` of `login`
#[derive(Debug, Default, Deserialize)]
pub struct LoginData {
    #[serde(default, rename = "apisessionid")]
    pub api_session_id: String,
}

/// Zone as sent and received
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireZone {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ttl: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub refresh: String,
    #[serde(default)]
    pub retry: String,
    #[serde(default)]
    pub expire: String,
    #[serde(default, rename = "dnssecstatus")]
    pub dnssec_status: bool,
}

impl From<&ZoneInfo> for WireZone {
    fn from(zone: &ZoneInfo) -> Self {
        Self {
            name: zone.name.clone(),
            ttl: zone.ttl.clone(),
            serial: zone.serial.clone(),
            refresh: zone.refresh.clone(),
            retry: zone.retry.clone(),
            expire: zone.expire.clone(),
            dnssec_status: zone.dnssec,
        }
    }
}

impl From<WireZone> for ZoneInfo {
    fn from(zone: WireZone) -> Self {
        Self {
            name: zone.name,
            ttl: zone.ttl,
            serial: zone.serial,
            refresh: zone.refresh,
            retry: zone.retry,
            expire: zone.expire,
            dnssec: zone.dnssec_status,
        }
    }
}

/// Record as sent and received
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, rename = "deleterecord")]
    pub delete_record: bool,
    #[serde(default)]
    pub state: String,
}

impl From<&DnsRecord> for WireRecord {
    fn from(record: &DnsRecord) -> Self {
        Self {
            id: record.id.clone().unwrap_or_default(),
            hostname: record.label.clone(),
            record_type: record.record_type.clone(),
            priority: record.priority.clone(),
            destination: record.target.clone(),
            delete_record: record.delete,
            state: record.state.clone().unwrap_or_default(),
        }
    }
}

impl From<WireRecord> for DnsRecord {
    fn from(record: WireRecord) -> Self {
        Self {
            id: Some(record.id).filter(|id| !id.is_empty()),
            label: record.hostname,
            record_type: record.record_type,
            priority: record.priority,
            target: record.destination,
            delete: record.delete_record,
            state: Some(record.state).filter(|s| !s.is_empty()),
        }
    }
}

/// `dnsrecordset` request field and `responsedata` of the record actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecordSet {
    #[serde(default, rename = "dnsrecords")]
    pub dns_records: Vec<WireRecord>,
}
