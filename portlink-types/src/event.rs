//! The general event model.
//!
//! Events are the broker's notification currency. Each variant declares
//! whether it is *mergeable*: a mergeable event's identity for queueing and
//! delivery purposes is its logical subject, not its timestamp or payload,
//! which lets a coalescing delivery queue replace an older undelivered event
//! with a newer one for the same subject without growing unbounded.
//!
//! The subject computation is a pure function consumed identically by the
//! event bus and by the scheduler's own coalescing.

use crate::{DataElement, ModuleId, PortId, Rights};
use serde::{Deserialize, Serialize};

/// What happened to an element, as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementEventType {
    /// The element appeared.
    Created,
    /// The element's content or metadata changed.
    Modified,
    /// The element was removed.
    Deleted,
}

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Provider availability flags, reported through `send_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderStateFlags(u32);

impl ProviderStateFlags {
    pub const OFFLINE: ProviderStateFlags = ProviderStateFlags(0);
    /// The provider is reachable and serving.
    pub const ONLINE: ProviderStateFlags = ProviderStateFlags(1 << 0);
    /// Reachable but slow or partially failing.
    pub const DEGRADED: ProviderStateFlags = ProviderStateFlags(1 << 1);
    /// Writes are currently rejected.
    pub const READ_ONLY: ProviderStateFlags = ProviderStateFlags(1 << 2);
    /// Transiently busy; work should be postponed, not failed.
    pub const BUSY: ProviderStateFlags = ProviderStateFlags(1 << 3);

    /// Builds flags from a raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bit pattern.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(&self, other: ProviderStateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// How the connection topology changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyChange {
    Added,
    Removed,
    Updated,
}

/// Coarse lifecycle state of the whole broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStateKind {
    Startup,
    Running,
    Shutdown,
}

/// Discriminant of a [`GeneralEvent`], for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ConnectionUpdate,
    DataElementChange,
    Log,
    ModuleActivity,
    ModuleUpdate,
    PortUpdate,
    ProviderState,
    SystemState,
}

/// Logical subject of a mergeable event.
///
/// Two mergeable events with equal subjects are "the same pending
/// notification": a coalescing queue keeps only the newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSubject {
    /// A connection, identified by both endpoints.
    Connection {
        prosumer_module: ModuleId,
        prosumer_port: PortId,
        provider_module: ModuleId,
        provider_port: PortId,
    },
    /// A module.
    Module(ModuleId),
    /// A port.
    Port { module: ModuleId, port: PortId },
    /// A provider port's availability.
    Provider { module: ModuleId, port: PortId },
    /// The system as a whole; only the latest state matters.
    System,
}

/// A broker event.
///
/// Every variant carries its creation timestamp as epoch millis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneralEvent {
    /// The connection topology changed. Mergeable per connection.
    ConnectionUpdate {
        created_ms: u64,
        prosumer_module: ModuleId,
        prosumer_port: PortId,
        provider_module: ModuleId,
        provider_port: PortId,
        change: TopologyChange,
    },

    /// A provider reported an element change. Not mergeable at the bus:
    /// burst coalescing for elements is the scheduler's job.
    DataElementChange {
        created_ms: u64,
        source_port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    },

    /// A log line surfaced as an event. Not mergeable.
    Log {
        created_ms: u64,
        module: ModuleId,
        level: LogLevel,
        message: String,
    },

    /// A module did something noteworthy (dropped work, expiry sweeps).
    /// Not mergeable: activity entries are an audit trail.
    ModuleActivity {
        created_ms: u64,
        module: ModuleId,
        activity: String,
    },

    /// A module's registration or readiness changed. Mergeable per module.
    ModuleUpdate {
        created_ms: u64,
        module: ModuleId,
        ready: bool,
    },

    /// A port was registered or unregistered. Mergeable per port.
    PortUpdate {
        created_ms: u64,
        module: ModuleId,
        port: PortId,
        registered: bool,
    },

    /// A provider reported its availability. Mergeable per provider port.
    ProviderState {
        created_ms: u64,
        module: ModuleId,
        port: PortId,
        flags: ProviderStateFlags,
    },

    /// The broker's lifecycle state changed. Mergeable; only the latest
    /// system state is worth delivering.
    SystemState {
        created_ms: u64,
        state: SystemStateKind,
    },
}

impl GeneralEvent {
    /// Creation timestamp as epoch millis.
    #[must_use]
    pub fn created_ms(&self) -> u64 {
        match self {
            GeneralEvent::ConnectionUpdate { created_ms, .. }
            | GeneralEvent::DataElementChange { created_ms, .. }
            | GeneralEvent::Log { created_ms, .. }
            | GeneralEvent::ModuleActivity { created_ms, .. }
            | GeneralEvent::ModuleUpdate { created_ms, .. }
            | GeneralEvent::PortUpdate { created_ms, .. }
            | GeneralEvent::ProviderState { created_ms, .. }
            | GeneralEvent::SystemState { created_ms, .. } => *created_ms,
        }
    }

    /// The logical subject key, or `None` for non-mergeable events.
    ///
    /// Pure function: timestamp and payload are excluded by construction.
    #[must_use]
    pub fn subject(&self) -> Option<EventSubject> {
        match self {
            GeneralEvent::ConnectionUpdate {
                prosumer_module,
                prosumer_port,
                provider_module,
                provider_port,
                ..
            } => Some(EventSubject::Connection {
                prosumer_module: *prosumer_module,
                prosumer_port: *prosumer_port,
                provider_module: *provider_module,
                provider_port: *provider_port,
            }),
            GeneralEvent::ModuleUpdate { module, .. } => Some(EventSubject::Module(*module)),
            GeneralEvent::PortUpdate { module, port, .. } => Some(EventSubject::Port {
                module: *module,
                port: *port,
            }),
            GeneralEvent::ProviderState { module, port, .. } => Some(EventSubject::Provider {
                module: *module,
                port: *port,
            }),
            GeneralEvent::SystemState { .. } => Some(EventSubject::System),
            GeneralEvent::DataElementChange { .. }
            | GeneralEvent::Log { .. }
            | GeneralEvent::ModuleActivity { .. } => None,
        }
    }

    /// Whether a coalescing queue may merge this event by subject.
    #[must_use]
    pub fn is_mergeable(&self) -> bool {
        self.subject().is_some()
    }

    /// The variant's discriminant.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            GeneralEvent::ConnectionUpdate { .. } => EventKind::ConnectionUpdate,
            GeneralEvent::DataElementChange { .. } => EventKind::DataElementChange,
            GeneralEvent::Log { .. } => EventKind::Log,
            GeneralEvent::ModuleActivity { .. } => EventKind::ModuleActivity,
            GeneralEvent::ModuleUpdate { .. } => EventKind::ModuleUpdate,
            GeneralEvent::PortUpdate { .. } => EventKind::PortUpdate,
            GeneralEvent::ProviderState { .. } => EventKind::ProviderState,
            GeneralEvent::SystemState { .. } => EventKind::SystemState,
        }
    }

    /// The right a subscriber must hold to receive this event.
    #[must_use]
    pub fn required_right(&self) -> Rights {
        match self {
            GeneralEvent::ConnectionUpdate { .. }
            | GeneralEvent::ModuleUpdate { .. }
            | GeneralEvent::PortUpdate { .. } => Rights::RCV_MOD_AND_PORT_UPDATE,
            GeneralEvent::DataElementChange { .. } => Rights::RCV_ELEMENT_EVENTS,
            GeneralEvent::Log { .. } | GeneralEvent::ModuleActivity { .. } => {
                Rights::RCV_LOG_EVENTS
            }
            GeneralEvent::ProviderState { .. } => Rights::RCV_PROVIDER_STATE,
            GeneralEvent::SystemState { .. } => Rights::RCV_SYSTEM_STATE,
        }
    }
}
