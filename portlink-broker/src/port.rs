//! Ports and connections.
//!
//! A port is a typed endpoint owned by exactly one module. A connection is a
//! directed edge from a prosumer port to a provider port; connections are
//! created and removed only through explicit registry operations, never
//! implicitly by data flow.

use portlink_types::{ModuleId, PortId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a port consumes or serves data elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Consumes data from a connected provider. At most one active
    /// connection.
    Prosumer,
    /// Serves hierarchical data elements. Unbounded connections unless
    /// configured otherwise.
    Provider,
}

/// Identity of a port: owning module, port id, and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub module: ModuleId,
    pub port: PortId,
    pub kind: PortKind,
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.port)
    }
}

/// A port as known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPort {
    pub port_ref: PortRef,
    /// Maximum simultaneous connections; `None` means unbounded.
    pub max_connections: Option<usize>,
}

impl RegisteredPort {
    /// A prosumer port with the default limit of one connection.
    #[must_use]
    pub fn prosumer(module: ModuleId, port: PortId) -> Self {
        Self {
            port_ref: PortRef {
                module,
                port,
                kind: PortKind::Prosumer,
            },
            max_connections: Some(1),
        }
    }

    /// A provider port with unbounded connections.
    #[must_use]
    pub fn provider(module: ModuleId, port: PortId) -> Self {
        Self {
            port_ref: PortRef {
                module,
                port,
                kind: PortKind::Provider,
            },
            max_connections: None,
        }
    }

    /// Overrides the connection limit.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }
}

/// Identity of a connection: the (prosumer, provider) endpoint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub prosumer_module: ModuleId,
    pub prosumer_port: PortId,
    pub provider_module: ModuleId,
    pub provider_port: PortId,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} -> {}/{}",
            self.prosumer_module, self.prosumer_port, self.provider_module, self.provider_port
        )
    }
}

/// A directed edge from a prosumer port to a provider port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub key: ConnectionKey,
    /// Higher priority is served first when a prosumer could pick among
    /// providers.
    pub priority: i32,
    pub active: bool,
    /// Monotonic transfer counter.
    pub bytes_transferred: u64,
    /// Epoch millis of the last refresh.
    pub last_refresh_ms: u64,
}

impl Connection {
    /// A fresh active connection with default priority.
    #[must_use]
    pub fn new(key: ConnectionKey, now_ms: u64) -> Self {
        Self {
            key,
            priority: 0,
            active: true,
            bytes_transferred: 0,
            last_refresh_ms: now_ms,
        }
    }

    /// Records a completed transfer, bumping the counter and refresh stamp.
    pub fn record_transfer(&mut self, bytes: u64, now_ms: u64) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(bytes);
        self.last_refresh_ms = now_ms;
    }
}
