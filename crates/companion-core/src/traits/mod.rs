//! Collaborator traits of the companion core
//!
//! - [`DnsApi`] / [`DnsSession`]: session-oriented DNS management service
//! - [`StateStore`]: durable record of what was applied
//! - [`AddressResolver`]: the address records should point at
//! - [`FactSource`]: desired-state facts, one-shot and live
//! - [`Notifier`]: fire-and-forget operational messages

pub mod address;
pub mod dns_api;
pub mod fact_source;
pub mod notifier;
pub mod state_store;

pub use address::{AddressResolver, OutboundAddressResolver, StaticAddress};
pub use dns_api::{DnsApi, DnsSession};
pub use fact_source::{ChannelFactSource, FactSource, FactStream, StaticFactSource};
pub use notifier::{LogNotifier, NoopNotifier, NotificationLevel, Notifier};
pub use state_store::{PersistedEntry, StateStore};
