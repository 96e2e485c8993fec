//! Port, connection, and rights model for PortLink.
//!
//! The broker is the routing hub between pluggable modules. Modules own
//! typed ports (prosumer or provider); the broker — not the module — tracks
//! which ports are connected, enforces the rights mask on every privileged
//! operation, and fans change notifications out through a coalescing event
//! bus.
//!
//! # Components
//!
//! - **Registry**: port registration and the connection set, every mutation
//!   rights-gated and followed by a mergeable topology event
//! - **Event bus**: publish/subscribe with per-subscriber coalescing queues
//! - **Contracts**: the traits excluded subsystems implement (module
//!   lifecycle, provider queries, provider emission, configuration store)
//! - **Settings store**: SQLite-backed configuration persistence

mod auth;
mod bus;
pub mod contracts;
mod error;
mod port;
mod registry;
mod settings;

pub use auth::authorize;
pub use bus::{EventBus, EventSubscription, DEFAULT_LOSSY_BACKLOG};
pub use contracts::{
    BusSink, ConfigStore, ElementListener, ModuleLifecycle, ProviderSink, ProviderSource,
    SourceError, SourceResult,
};
pub use error::{BrokerError, BrokerResult};
pub use port::{Connection, ConnectionKey, PortKind, PortRef, RegisteredPort};
pub use registry::Broker;
pub use settings::SettingsStore;

/// Current time as epoch millis, for event stamps and refresh counters.
///
/// Scheduler logic must not call this — it takes its time from an injected
/// clock so backoff and expiry stay deterministic under test.
#[must_use]
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}
