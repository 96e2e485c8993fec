//! The port and connection registry.
//!
//! All topology mutations go through here. Each operation consults the
//! authorization gate first, mutates under a short write lock, and emits the
//! matching mergeable topology event after the lock is released. A failed
//! operation performs no side effect.

use crate::auth::authorize;
use crate::bus::EventBus;
use crate::error::{BrokerError, BrokerResult};
use crate::port::{Connection, ConnectionKey, PortKind, RegisteredPort};
use portlink_types::{GeneralEvent, ModuleId, PortId, Rights, TopologyChange};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// The broker registry: ports, connections, and the gate in front of them.
pub struct Broker {
    ports: RwLock<HashMap<(ModuleId, PortId), RegisteredPort>>,
    connections: RwLock<HashMap<ConnectionKey, Connection>>,
    bus: EventBus,
}

impl Broker {
    /// Creates an empty registry publishing to the given bus.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            ports: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// The bus this registry publishes topology events to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Ports ────────────────────────────────────────────────────

    /// Registers a port for a module.
    pub fn register_port(&self, held: Rights, port: RegisteredPort) -> BrokerResult<()> {
        authorize(held, Rights::MANAGE_PORTS)?;

        let id = (port.port_ref.module, port.port_ref.port);
        {
            let mut ports = self.ports.write().unwrap();
            if ports.contains_key(&id) {
                return Err(BrokerError::DuplicatePort(format!("{}", port.port_ref)));
            }
            ports.insert(id, port.clone());
        }

        debug!(port = %port.port_ref, "port registered");
        self.bus.publish(GeneralEvent::PortUpdate {
            created_ms: crate::now_ms(),
            module: id.0,
            port: id.1,
            registered: true,
        });
        Ok(())
    }

    /// Unregisters a port and purges its connections.
    pub fn unregister_port(&self, held: Rights, module: ModuleId, port: PortId) -> BrokerResult<()> {
        authorize(held, Rights::MANAGE_PORTS)?;

        let removed_connections = {
            let mut ports = self.ports.write().unwrap();
            if ports.remove(&(module, port)).is_none() {
                return Err(BrokerError::PortNotFound(format!("{module}/{port}")));
            }

            let mut connections = self.connections.write().unwrap();
            let stale: Vec<ConnectionKey> = connections
                .keys()
                .filter(|key| {
                    (key.prosumer_module == module && key.prosumer_port == port)
                        || (key.provider_module == module && key.provider_port == port)
                })
                .copied()
                .collect();
            for key in &stale {
                connections.remove(key);
            }
            stale
        };

        let now = crate::now_ms();
        for key in removed_connections {
            self.publish_connection(&key, TopologyChange::Removed, now);
        }
        self.bus.publish(GeneralEvent::PortUpdate {
            created_ms: now,
            module,
            port,
            registered: false,
        });
        Ok(())
    }

    /// Whether a port with this identity is registered.
    #[must_use]
    pub fn port_exists(&self, module: ModuleId, port: PortId) -> bool {
        self.ports.read().unwrap().contains_key(&(module, port))
    }

    /// All registered ports.
    #[must_use]
    pub fn ports(&self) -> Vec<RegisteredPort> {
        self.ports.read().unwrap().values().cloned().collect()
    }

    // ── Connections ──────────────────────────────────────────────

    /// Adds a connection from a prosumer port to a provider port.
    pub fn add_connection(
        &self,
        held: Rights,
        prosumer: (ModuleId, PortId),
        provider: (ModuleId, PortId),
    ) -> BrokerResult<ConnectionKey> {
        authorize(held, Rights::MANAGE_CONNECTIONS)?;

        let key = ConnectionKey {
            prosumer_module: prosumer.0,
            prosumer_port: prosumer.1,
            provider_module: provider.0,
            provider_port: provider.1,
        };

        let now = crate::now_ms();
        {
            let ports = self.ports.read().unwrap();
            let prosumer_port = ports
                .get(&prosumer)
                .filter(|p| p.port_ref.kind == PortKind::Prosumer)
                .ok_or_else(|| {
                    BrokerError::PortNotFound(format!("{}/{}", prosumer.0, prosumer.1))
                })?;
            let provider_port = ports
                .get(&provider)
                .filter(|p| p.port_ref.kind == PortKind::Provider)
                .ok_or_else(|| {
                    BrokerError::PortNotFound(format!("{}/{}", provider.0, provider.1))
                })?;

            let mut connections = self.connections.write().unwrap();
            if connections.contains_key(&key) {
                return Err(BrokerError::AlreadyExists(format!("{key}")));
            }

            let prosumer_load = connections
                .keys()
                .filter(|k| k.prosumer_module == prosumer.0 && k.prosumer_port == prosumer.1)
                .count();
            if let Some(max) = prosumer_port.max_connections {
                if prosumer_load >= max {
                    return Err(BrokerError::AlreadyConnected(format!(
                        "{}/{}",
                        prosumer.0, prosumer.1
                    )));
                }
            }

            let provider_load = connections
                .keys()
                .filter(|k| k.provider_module == provider.0 && k.provider_port == provider.1)
                .count();
            if let Some(max) = provider_port.max_connections {
                if provider_load >= max {
                    return Err(BrokerError::AlreadyConnected(format!(
                        "{}/{}",
                        provider.0, provider.1
                    )));
                }
            }

            connections.insert(key, Connection::new(key, now));
        }

        debug!(connection = %key, "connection added");
        self.publish_connection(&key, TopologyChange::Added, now);
        Ok(key)
    }

    /// Removes a connection.
    pub fn remove_connection(&self, held: Rights, key: ConnectionKey) -> BrokerResult<()> {
        authorize(held, Rights::MANAGE_CONNECTIONS)?;

        {
            let mut connections = self.connections.write().unwrap();
            if connections.remove(&key).is_none() {
                return Err(BrokerError::ConnectionNotFound(format!("{key}")));
            }
        }

        self.publish_connection(&key, TopologyChange::Removed, crate::now_ms());
        Ok(())
    }

    /// Updates a connection's priority and/or active flag.
    pub fn update_connection(
        &self,
        held: Rights,
        key: ConnectionKey,
        priority: Option<i32>,
        active: Option<bool>,
    ) -> BrokerResult<()> {
        authorize(held, Rights::MANAGE_CONNECTIONS)?;

        {
            let mut connections = self.connections.write().unwrap();
            let connection = connections
                .get_mut(&key)
                .ok_or_else(|| BrokerError::ConnectionNotFound(format!("{key}")))?;
            if let Some(priority) = priority {
                connection.priority = priority;
            }
            if let Some(active) = active {
                connection.active = active;
            }
        }

        self.publish_connection(&key, TopologyChange::Updated, crate::now_ms());
        Ok(())
    }

    /// Records bytes moved over a connection. Bookkeeping, not a topology
    /// change: no rights check, no event.
    pub fn record_transfer(&self, key: ConnectionKey, bytes: u64) -> BrokerResult<()> {
        let mut connections = self.connections.write().unwrap();
        let connection = connections
            .get_mut(&key)
            .ok_or_else(|| BrokerError::ConnectionNotFound(format!("{key}")))?;
        connection.record_transfer(bytes, crate::now_ms());
        Ok(())
    }

    /// All current connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().unwrap().values().cloned().collect()
    }

    /// Connections touching the given port on either side.
    #[must_use]
    pub fn connections_of(&self, module: ModuleId, port: PortId) -> Vec<Connection> {
        self.connections
            .read()
            .unwrap()
            .values()
            .filter(|c| {
                (c.key.prosumer_module == module && c.key.prosumer_port == port)
                    || (c.key.provider_module == module && c.key.provider_port == port)
            })
            .cloned()
            .collect()
    }

    /// Provider candidates for a prosumer port, highest priority first.
    #[must_use]
    pub fn providers_for(&self, module: ModuleId, port: PortId) -> Vec<Connection> {
        let mut candidates: Vec<Connection> = self
            .connections
            .read()
            .unwrap()
            .values()
            .filter(|c| {
                c.key.prosumer_module == module && c.key.prosumer_port == port && c.active
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        candidates
    }

    // ── Modules ──────────────────────────────────────────────────

    /// Publishes a module readiness change.
    pub fn mark_module_ready(
        &self,
        held: Rights,
        module: ModuleId,
        ready: bool,
    ) -> BrokerResult<()> {
        authorize(held, Rights::MANAGE_PORTS)?;
        self.bus.publish(GeneralEvent::ModuleUpdate {
            created_ms: crate::now_ms(),
            module,
            ready,
        });
        Ok(())
    }

    fn publish_connection(&self, key: &ConnectionKey, change: TopologyChange, now: u64) {
        self.bus.publish(GeneralEvent::ConnectionUpdate {
            created_ms: now,
            prosumer_module: key.prosumer_module,
            prosumer_port: key.prosumer_port,
            provider_module: key.provider_module,
            provider_port: key.provider_port,
            change,
        });
    }
}
