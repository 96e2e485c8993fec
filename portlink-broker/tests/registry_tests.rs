use portlink_broker::{Broker, BrokerError, EventBus, RegisteredPort};
use portlink_types::{GeneralEvent, ModuleId, PortId, Rights, TopologyChange};

fn admin() -> Rights {
    Rights::MANAGE_PORTS | Rights::MANAGE_CONNECTIONS
}

fn make_broker() -> Broker {
    Broker::new(EventBus::new())
}

fn wired_pair(broker: &Broker) -> ((ModuleId, PortId), (ModuleId, PortId)) {
    let prosumer = (ModuleId::new(), PortId::new());
    let provider = (ModuleId::new(), PortId::new());
    broker
        .register_port(admin(), RegisteredPort::prosumer(prosumer.0, prosumer.1))
        .unwrap();
    broker
        .register_port(admin(), RegisteredPort::provider(provider.0, provider.1))
        .unwrap();
    (prosumer, provider)
}

// ── Port registration ────────────────────────────────────────────

#[test]
fn register_and_query_port() {
    let broker = make_broker();
    let module = ModuleId::new();
    let port = PortId::new();

    broker
        .register_port(admin(), RegisteredPort::provider(module, port))
        .unwrap();

    assert!(broker.port_exists(module, port));
    assert_eq!(broker.ports().len(), 1);
}

#[test]
fn duplicate_port_is_rejected() {
    let broker = make_broker();
    let module = ModuleId::new();
    let port = PortId::new();

    broker
        .register_port(admin(), RegisteredPort::provider(module, port))
        .unwrap();
    let err = broker
        .register_port(admin(), RegisteredPort::provider(module, port))
        .unwrap_err();

    assert!(matches!(err, BrokerError::DuplicatePort(_)));
}

#[test]
fn unregister_unknown_port_is_not_found() {
    let broker = make_broker();
    let err = broker
        .unregister_port(admin(), ModuleId::new(), PortId::new())
        .unwrap_err();
    assert!(matches!(err, BrokerError::PortNotFound(_)));
}

#[test]
fn unauthorized_registration_has_no_side_effect() {
    let broker = make_broker();
    let module = ModuleId::new();
    let port = PortId::new();

    let err = broker
        .register_port(Rights::NONE, RegisteredPort::provider(module, port))
        .unwrap_err();

    assert!(matches!(err, BrokerError::Unauthorized { .. }));
    assert!(!broker.port_exists(module, port));
    assert!(broker.ports().is_empty());
}

// ── Connections ──────────────────────────────────────────────────

#[test]
fn add_connection_between_registered_ports() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);

    let key = broker.add_connection(admin(), prosumer, provider).unwrap();

    let connections = broker.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].key, key);
    assert!(connections[0].active);
    assert_eq!(connections[0].priority, 0);
}

#[test]
fn add_connection_with_unknown_port_is_not_found() {
    let broker = make_broker();
    let (prosumer, _) = wired_pair(&broker);

    let err = broker
        .add_connection(admin(), prosumer, (ModuleId::new(), PortId::new()))
        .unwrap_err();
    assert!(matches!(err, BrokerError::PortNotFound(_)));
    assert!(broker.connections().is_empty());
}

#[test]
fn connecting_two_providers_is_not_found() {
    let broker = make_broker();
    let (_, provider) = wired_pair(&broker);
    let other = (ModuleId::new(), PortId::new());
    broker
        .register_port(admin(), RegisteredPort::provider(other.0, other.1))
        .unwrap();

    // The named "prosumer" endpoint is a provider port.
    let err = broker.add_connection(admin(), other, provider).unwrap_err();
    assert!(matches!(err, BrokerError::PortNotFound(_)));
}

#[test]
fn duplicate_pair_is_already_exists() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);

    broker.add_connection(admin(), prosumer, provider).unwrap();
    let err = broker
        .add_connection(admin(), prosumer, provider)
        .unwrap_err();
    assert!(matches!(err, BrokerError::AlreadyExists(_)));
}

#[test]
fn prosumer_limit_is_already_connected() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    let second = (ModuleId::new(), PortId::new());
    broker
        .register_port(admin(), RegisteredPort::provider(second.0, second.1))
        .unwrap();

    broker.add_connection(admin(), prosumer, provider).unwrap();
    // Default prosumer limit is one active connection.
    let err = broker.add_connection(admin(), prosumer, second).unwrap_err();
    assert!(matches!(err, BrokerError::AlreadyConnected(_)));
}

#[test]
fn provider_limit_is_enforced_when_configured() {
    let broker = make_broker();
    let provider = (ModuleId::new(), PortId::new());
    broker
        .register_port(
            admin(),
            RegisteredPort::provider(provider.0, provider.1).with_max_connections(1),
        )
        .unwrap();

    let first = (ModuleId::new(), PortId::new());
    let second = (ModuleId::new(), PortId::new());
    broker
        .register_port(admin(), RegisteredPort::prosumer(first.0, first.1))
        .unwrap();
    broker
        .register_port(admin(), RegisteredPort::prosumer(second.0, second.1))
        .unwrap();

    broker.add_connection(admin(), first, provider).unwrap();
    let err = broker.add_connection(admin(), second, provider).unwrap_err();
    assert!(matches!(err, BrokerError::AlreadyConnected(_)));
}

#[test]
fn remove_connection_then_not_found() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    let key = broker.add_connection(admin(), prosumer, provider).unwrap();

    broker.remove_connection(admin(), key).unwrap();
    assert!(broker.connections().is_empty());

    let err = broker.remove_connection(admin(), key).unwrap_err();
    assert!(matches!(err, BrokerError::ConnectionNotFound(_)));
}

#[test]
fn update_connection_priority_and_active() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    let key = broker.add_connection(admin(), prosumer, provider).unwrap();

    broker
        .update_connection(admin(), key, Some(7), Some(false))
        .unwrap();

    let connection = &broker.connections()[0];
    assert_eq!(connection.priority, 7);
    assert!(!connection.active);
}

#[test]
fn record_transfer_bumps_counter() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    let key = broker.add_connection(admin(), prosumer, provider).unwrap();

    broker.record_transfer(key, 512).unwrap();
    broker.record_transfer(key, 256).unwrap();

    assert_eq!(broker.connections()[0].bytes_transferred, 768);
}

#[test]
fn unregister_port_purges_its_connections() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    broker.add_connection(admin(), prosumer, provider).unwrap();

    broker
        .unregister_port(admin(), provider.0, provider.1)
        .unwrap();

    assert!(broker.connections().is_empty());
    assert!(!broker.port_exists(provider.0, provider.1));
    assert!(broker.port_exists(prosumer.0, prosumer.1));
}

#[test]
fn providers_for_sorts_by_descending_priority() {
    let broker = make_broker();
    let prosumer = (ModuleId::new(), PortId::new());
    broker
        .register_port(
            admin(),
            RegisteredPort::prosumer(prosumer.0, prosumer.1).with_max_connections(3),
        )
        .unwrap();

    let mut keys = Vec::new();
    for _ in 0..3 {
        let provider = (ModuleId::new(), PortId::new());
        broker
            .register_port(admin(), RegisteredPort::provider(provider.0, provider.1))
            .unwrap();
        keys.push(broker.add_connection(admin(), prosumer, provider).unwrap());
    }
    broker
        .update_connection(admin(), keys[0], Some(1), None)
        .unwrap();
    broker
        .update_connection(admin(), keys[1], Some(9), None)
        .unwrap();
    broker
        .update_connection(admin(), keys[2], Some(5), None)
        .unwrap();

    let ranked = broker.providers_for(prosumer.0, prosumer.1);
    let priorities: Vec<i32> = ranked.iter().map(|c| c.priority).collect();
    assert_eq!(priorities, vec![9, 5, 1]);
}

#[test]
fn connections_of_sees_both_sides() {
    let broker = make_broker();
    let (prosumer, provider) = wired_pair(&broker);
    broker.add_connection(admin(), prosumer, provider).unwrap();

    assert_eq!(broker.connections_of(prosumer.0, prosumer.1).len(), 1);
    assert_eq!(broker.connections_of(provider.0, provider.1).len(), 1);
    assert!(broker.connections_of(ModuleId::new(), PortId::new()).is_empty());
}

// ── Topology events ──────────────────────────────────────────────

#[tokio::test]
async fn successful_operations_emit_topology_events() {
    let bus = EventBus::new();
    let subscription = bus.subscribe(Rights::RCV_MOD_AND_PORT_UPDATE);
    let broker = Broker::new(bus);
    let (prosumer, provider) = wired_pair(&broker);

    // Two PortUpdate events from wiring the pair.
    for _ in 0..2 {
        match subscription.recv().await.unwrap() {
            GeneralEvent::PortUpdate { registered, .. } => assert!(registered),
            other => panic!("expected PortUpdate, got {other:?}"),
        }
    }

    broker.add_connection(admin(), prosumer, provider).unwrap();
    match subscription.recv().await.unwrap() {
        GeneralEvent::ConnectionUpdate { change, .. } => {
            assert_eq!(change, TopologyChange::Added)
        }
        other => panic!("expected ConnectionUpdate, got {other:?}"),
    }
}

#[tokio::test]
async fn module_readiness_coalesces_per_module() {
    let broker = make_broker();
    let subscription = broker.bus().subscribe(Rights::RCV_MOD_AND_PORT_UPDATE);
    let module = ModuleId::new();

    broker.mark_module_ready(admin(), module, false).unwrap();
    broker.mark_module_ready(admin(), module, true).unwrap();

    // One pending notification per module, latest readiness wins.
    match subscription.recv().await.unwrap() {
        GeneralEvent::ModuleUpdate { module: m, ready, .. } => {
            assert_eq!(m, module);
            assert!(ready);
        }
        other => panic!("expected ModuleUpdate, got {other:?}"),
    }
    assert!(subscription.try_recv().is_none());
}

#[tokio::test]
async fn failed_operations_emit_nothing() {
    let bus = EventBus::new();
    let subscription = bus.subscribe(Rights::RCV_MOD_AND_PORT_UPDATE);
    let broker = Broker::new(bus);

    let module = ModuleId::new();
    let port = PortId::new();
    let _ = broker.register_port(Rights::NONE, RegisteredPort::provider(module, port));

    assert_eq!(subscription.backlog(), 0);
    assert!(subscription.try_recv().is_none());
}
