// # Address Resolver Trait
//
// Determines the address new records should point at.
//
// ## Implementations
//
// - `StaticAddress`: a fixed, configured address
// - `OutboundAddressResolver`: local address of the default outbound route
// - HTTP-based public address lookup: `companion-ip-http` crate

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Trait for address resolvers
///
/// Implementations are consulted once per unit of work. They must not
/// cache indefinitely; the host's address may change at runtime.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Current address of this host
    async fn resolve(&self) -> Result<IpAddr>;

    /// Resolver name used in logs
    fn name(&self) -> &'static str;
}

/// Always resolves to the same address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddress(pub IpAddr);

#[async_trait]
impl AddressResolver for StaticAddress {
    async fn resolve(&self) -> Result<IpAddr> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Default route target; no packet is sent, only the route is selected
pub const DEFAULT_ROUTE_TARGET: &str = "8.8.8.8:80";

/// Resolves the local address the kernel would use for outbound traffic
///
/// Connecting a UDP socket only selects a route, so this works without
/// network access to the route target. Behind NAT the result is a private
/// address; a warning is logged and the address is still returned.
#[derive(Debug, Clone)]
pub struct OutboundAddressResolver {
    target: SocketAddr,
}

impl OutboundAddressResolver {
    /// Create a resolver routing towards [`DEFAULT_ROUTE_TARGET`]
    pub fn new() -> Self {
        Self {
            target: SocketAddr::from(([8, 8, 8, 8], 80)),
        }
    }

    /// Use a different route target
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for OutboundAddressResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for OutboundAddressResolver {
    async fn resolve(&self) -> Result<IpAddr> {
        let bind: SocketAddr = if self.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = tokio::net::UdpSocket::bind(bind).await?;
        socket
            .connect(self.target)
            .await
            .map_err(|e| Error::transport(format!("no route to {}: {}", self.target, e)))?;
        let ip = socket.local_addr()?.ip();

        if ip.is_unspecified() {
            return Err(Error::transport("outbound route has no local address"));
        }
        if is_non_public(&ip) {
            warn!(%ip, "Detected address is not public; set HOST_IP to override");
        } else {
            debug!(%ip, "Detected outbound address");
        }
        Ok(ip)
    }

    fn name(&self) -> &'static str {
        "outbound"
    }
}

/// Private, loopback or link-local
pub fn is_non_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_address_resolves_to_itself() {
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        assert_eq!(StaticAddress(ip).resolve().await.unwrap(), ip);
    }

    #[tokio::test]
    async fn outbound_resolver_uses_loopback_route() {
        let resolver = OutboundAddressResolver::with_target("127.0.0.1:9".parse().unwrap());
        let ip = resolver.resolve().await.unwrap();
        assert!(ip.is_loopback());
    }

    #[test]
    fn classifies_non_public_addresses() {
        for private in ["10.1.2.3", "192.168.0.10", "172.16.5.4", "127.0.0.1", "169.254.1.1", "fd00::1", "fe80::1", "::1"] {
            assert!(is_non_public(&private.parse().unwrap()), "{private}");
        }
        for public in ["203.0.113.5", "8.8.8.8", "2001:db8::1"] {
            assert!(!is_non_public(&public.parse().unwrap()), "{public}");
        }
    }
}
