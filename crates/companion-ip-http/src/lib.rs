// # HTTP Address Resolver
//
// Discovers the public address of this host by asking an external
// "what is my IP" service.
//
// ## Purpose
//
// The outbound-route resolver in `companion-core` reports the local
// interface address, which is private behind NAT. This resolver asks a
// service on the internet instead and returns the address it observed.
//
// ## Behaviour
//
// - Services are tried in order; the first valid answer wins
// - The response body is the bare address, surrounding whitespace ignored
// - Only IPv4 answers are accepted unless configured otherwise, since the
//   companion manages `A` records
// - No caching; every `resolve` call performs a fresh lookup

use async_trait::async_trait;
use companion_core::traits::AddressResolver;
use companion_core::{Error, Result};
use std::net::IpAddr;
use std::time::Duration;

/// Default lookup services, tried in order
pub const DEFAULT_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Default timeout for each lookup
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Public address lookup over HTTP
#[derive(Debug, Clone)]
pub struct HttpAddressResolver {
    /// Lookup URLs, tried in order
    services: Vec<String>,

    /// Reject IPv6 answers
    ipv4_only: bool,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpAddressResolver {
    /// Create a resolver using [`DEFAULT_SERVICES`]
    pub fn new() -> Result<Self> {
        Self::with_services(DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    /// Create a resolver using the given lookup URLs
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `services` is empty or the HTTP client
    /// cannot be built.
    pub fn with_services(services: Vec<String>) -> Result<Self> {
        if services.is_empty() {
            return Err(Error::config("at least one address lookup service is required"));
        }
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            services,
            ipv4_only: true,
            client,
        })
    }

    /// Accept IPv6 answers as well
    pub fn allow_ipv6(mut self) -> Self {
        self.ipv4_only = false;
        self
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    async fn lookup(&self, url: &str) -> Result<IpAddr> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("address lookup via {}: {}", url, e))
            } else {
                Error::transport(format!("address lookup via {}: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: format!("address lookup via {}", url),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("failed to read response from {}: {}", url, e)))?;

        let text = text.trim();
        let ip: IpAddr = text
            .parse()
            .map_err(|_| Error::invalid_input(format!("{} returned no address: {:?}", url, text)))?;

        if self.ipv4_only && !ip.is_ipv4() {
            return Err(Error::invalid_input(format!(
                "{} returned {}, expected IPv4",
                url, ip
            )));
        }

        Ok(ip)
    }
}

#[async_trait]
impl AddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        let mut last_error = None;

        for url in &self.services {
            match self.lookup(url).await {
                Ok(ip) => {
                    tracing::debug!(service = %url, %ip, "Resolved public address");
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!(service = %url, error = %e, "Address lookup failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Other("no address lookup service configured".into())))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
