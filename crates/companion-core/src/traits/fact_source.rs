// # Fact Source Trait
//
// Supplies desired-state facts: "this hostname should resolve to this host".
//
// ## Two Channels
//
// - `active_facts()`: one-shot enumeration of everything currently desired,
//   used at startup
// - `watch()`: stream of facts observed afterwards
//
// The same hostname may arrive on both; the engine deduplicates.

use async_trait::async_trait;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::record::HostFact;

/// Stream of live facts
pub type FactStream = Pin<Box<dyn Stream<Item = HostFact> + Send + 'static>>;

/// Trait for fact sources
///
/// # Stream Lifetime
///
/// The stream returned by `watch()` ends when the source can produce no more
/// facts. The engine keeps running its startup work and then stops consuming.
#[async_trait]
pub trait FactSource: Send + Sync {
    /// Facts that are desired right now
    async fn active_facts(&self) -> Result<Vec<HostFact>>;

    /// Subscribe to facts observed from now on
    ///
    /// Failing to subscribe is fatal for the caller.
    fn watch(&self) -> Result<FactStream>;
}

/// A fixed list of hosts
///
/// Every host is reported by `active_facts()`; the live stream stays open
/// and never yields.
#[derive(Debug, Clone, Default)]
pub struct StaticFactSource {
    facts: Vec<HostFact>,
}

impl StaticFactSource {
    /// Create a source from prepared facts
    pub fn new(facts: Vec<HostFact>) -> Self {
        Self { facts }
    }

    /// Parse a comma or whitespace separated hostname list
    ///
    /// Each item is either `hostname` or `hostname=address`.
    pub fn parse(list: &str) -> Result<Self> {
        let mut facts = Vec::new();
        for item in list.split(|c: char| c == ',' || c.is_whitespace()) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let fact = match item.split_once('=') {
                Some((host, addr)) => {
                    let target: IpAddr = addr.trim().parse().map_err(|_| {
                        Error::invalid_input(format!("invalid address for {}: {}", host, addr))
                    })?;
                    if !target.is_ipv4() {
                        return Err(Error::invalid_input(format!(
                            "address for {} must be IPv4: {}",
                            host, target
                        )));
                    }
                    HostFact::new(host.trim()).with_target(target)
                }
                None => HostFact::new(item),
            };
            if fact.hostname.is_empty() {
                return Err(Error::invalid_input(format!("empty hostname in '{}'", item)));
            }
            facts.push(fact);
        }
        Ok(Self { facts })
    }

    /// The configured facts
    pub fn facts(&self) -> &[HostFact] {
        &self.facts
    }
}

#[async_trait]
impl FactSource for StaticFactSource {
    async fn active_facts(&self) -> Result<Vec<HostFact>> {
        Ok(self.facts.clone())
    }

    fn watch(&self) -> Result<FactStream> {
        Ok(Box::pin(tokio_stream::pending()))
    }
}

/// Push-based source backed by an mpsc channel
///
/// Embedders push facts through the [`mpsc::Sender`] returned by
/// [`ChannelFactSource::new`]. The stream ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelFactSource {
    initial: Vec<HostFact>,
    receiver: Mutex<Option<mpsc::Receiver<HostFact>>>,
}

impl ChannelFactSource {
    /// Create a source reporting `initial` as active, plus its sender
    pub fn new(initial: Vec<HostFact>, capacity: usize) -> (Self, mpsc::Sender<HostFact>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            initial,
            receiver: Mutex::new(Some(rx)),
        };
        (source, tx)
    }
}

#[async_trait]
impl FactSource for ChannelFactSource {
    async fn active_facts(&self) -> Result<Vec<HostFact>> {
        Ok(self.initial.clone())
    }

    fn watch(&self) -> Result<FactStream> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| Error::Other("fact channel already subscribed".to_string()))?;
        Ok(Box::pin(ReceiverStream::new(receiver)))
    }
}
