//! Record-level data model
//!
//! A [`HostFact`] is one desired-state observation ("this hostname should
//! resolve to this host"). The zone/label split happens once, when the fact
//! is built, and is never recomputed downstream.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address record type managed by the companion
pub const RECORD_TYPE_A: &str = "A";

/// Label denoting the zone apex
pub const APEX_LABEL: &str = "@";

/// Split a hostname into `(zone, label)`
///
/// - `app.example.com` → (`example.com`, `app`)
/// - `a.b.example.com` → (`example.com`, `a.b`)
/// - `example.com` → (`example.com`, `@`)
/// - `localhost` → (`localhost`, `@`)
///
/// A single trailing dot (fully-qualified form) is ignored.
pub fn split_hostname(hostname: &str) -> (String, String) {
    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);
    let parts: Vec<&str> = hostname.split('.').collect();

    if parts.len() <= 2 {
        return (hostname.to_string(), APEX_LABEL.to_string());
    }

    let split_at = parts.len() - 2;
    (parts[split_at..].join("."), parts[..split_at].join("."))
}

/// Desired state for one hostname
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostFact {
    /// Fully qualified hostname (e.g. `app.example.com`)
    pub hostname: String,
    /// Registrable zone (e.g. `example.com`)
    pub zone: String,
    /// Label relative to the zone, `@` for the apex
    pub label: String,
    /// Address the record must resolve to; `None` defers to the engine
    pub target: Option<IpAddr>,
}

impl HostFact {
    /// Build a fact from a hostname, applying the zone split rule
    pub fn new(hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let hostname = hostname
            .strip_suffix('.')
            .map(str::to_string)
            .unwrap_or(hostname);
        let (zone, label) = split_hostname(&hostname);
        Self {
            hostname,
            zone,
            label,
            target: None,
        }
    }

    /// Pin the fact to a specific address
    pub fn with_target(mut self, target: IpAddr) -> Self {
        self.target = Some(target);
        self
    }

    /// Whether the fact names the zone apex
    pub fn is_apex(&self) -> bool {
        self.label == APEX_LABEL
    }
}

/// Zone metadata as reported by the DNS provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    /// Zone name
    pub name: String,
    /// Default TTL
    pub ttl: String,
    /// SOA serial
    pub serial: String,
    /// SOA refresh
    pub refresh: String,
    /// SOA retry
    pub retry: String,
    /// SOA expire
    pub expire: String,
    /// DNSSEC enabled for the zone
    pub dnssec: bool,
}

/// A record as held by the DNS provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider record id; `None` for records not yet created
    pub id: Option<String>,
    /// Label relative to the zone
    pub label: String,
    /// Record type (`A`, `AAAA`, `MX`, ...)
    pub record_type: String,
    /// Priority (only meaningful for some types)
    pub priority: String,
    /// Record content
    pub target: String,
    /// Ask the provider to delete this record
    pub delete: bool,
    /// Provider-side state, if reported
    pub state: Option<String>,
}

impl DnsRecord {
    /// The full desired state of an address record
    pub fn address(label: impl Into<String>, target: IpAddr) -> Self {
        Self {
            id: None,
            label: label.into(),
            record_type: RECORD_TYPE_A.to_string(),
            priority: "0".to_string(),
            target: target.to_string(),
            delete: false,
            state: None,
        }
    }

    /// Whether this is the address record for `label`
    pub fn is_address_for(&self, label: &str) -> bool {
        self.record_type.eq_ignore_ascii_case(RECORD_TYPE_A) && self.label.eq_ignore_ascii_case(label)
    }
}

/// What a fact requires of the remote record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// An address record with the desired target already exists
    InSync,
    /// No address record exists for the label
    Create,
    /// An address record exists with a different target
    Update {
        /// The target currently held remotely
        current: String,
    },
}

impl SyncDecision {
    /// Compare the remote record set against the desired target for `label`
    pub fn classify(records: &[DnsRecord], label: &str, target: IpAddr) -> Self {
        match records.iter().find(|r| r.is_address_for(label)) {
            Some(existing) => {
                let matches = existing
                    .target
                    .trim()
                    .parse::<IpAddr>()
                    .map(|ip| ip == target)
                    .unwrap_or(false);
                if matches {
                    SyncDecision::InSync
                } else {
                    SyncDecision::Update {
                        current: existing.target.clone(),
                    }
                }
            }
            None => SyncDecision::Create,
        }
    }

    /// Verb used in logs and notifications
    pub fn action(&self) -> &'static str {
        match self {
            SyncDecision::InSync => "none",
            SyncDecision::Create => "create",
            SyncDecision::Update { .. } => "update",
        }
    }
}
