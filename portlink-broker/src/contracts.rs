//! Collaborator contracts.
//!
//! Defines the traits the excluded subsystems implement (storage backends,
//! configuration layer, user interfaces), allowing the core to route and
//! schedule against any of them.

use async_trait::async_trait;
use portlink_types::{
    DataElement, ElementEventType, ElementPath, GeneralEvent, ModuleId, PortId,
    ProviderStateFlags,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Result type for provider operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a provider backend can report.
///
/// The engine classifies these into retry decisions: `Transient` drives
/// backoff, `Busy` drives postponement, everything else is caller-visible.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The element, port, or target is absent. Not retried.
    #[error("not found")]
    NotFound,

    /// The backend is temporarily unavailable; retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The backend is up but busy; postpone without charging the retry
    /// budget.
    #[error("backend busy")]
    Busy,

    /// The backend refused the operation.
    #[error("access denied: {0}")]
    Denied(String),

    /// An I/O failure that is not expected to heal on its own.
    #[error("io error: {0}")]
    Io(String),
}

/// Byte stream handed out by `read_data`.
pub type DataReader = Box<dyn AsyncRead + Send + Unpin>;
/// Byte stream handed out by `write_data`.
pub type DataWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle hooks every module implements for the broker.
#[async_trait]
pub trait ModuleLifecycle: Send + Sync {
    /// One-time setup; ports are registered here.
    async fn initialize(&self) -> SourceResult<()>;

    /// The broker is starting up; queries may still fail.
    async fn enter_startup(&self);

    /// Startup finished.
    async fn exit_startup(&self);

    /// The broker is shutting down; stop producing work.
    async fn enter_shutdown(&self);

    /// Teardown finished; ports are gone.
    async fn exit_shutdown(&self);

    /// Whether the module can serve queries right now.
    fn is_ready(&self) -> bool;

    /// One of the module's ports gained a connection.
    async fn on_port_connection(&self, port: PortId);

    /// One of the module's ports lost a connection.
    async fn on_port_disconnection(&self, port: PortId);

    /// A connected provider changed availability.
    async fn on_provider_state(&self, port: PortId, flags: ProviderStateFlags);
}

/// Callback for element-change subscriptions.
#[async_trait]
pub trait ElementListener: Send + Sync {
    async fn on_element_event(
        &self,
        port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    );
}

/// Prosumer-side query surface of a provider backend.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    /// Fetches the current snapshot of one element.
    async fn get_element(&self, port: PortId, path: &ElementPath) -> SourceResult<DataElement>;

    /// Lists children of a folder, optionally recursively.
    async fn get_child_elements(
        &self,
        port: PortId,
        path: &ElementPath,
        recursive: bool,
    ) -> SourceResult<Vec<DataElement>>;

    /// Subscribes to change notifications under a root path.
    async fn subscribe(
        &self,
        port: PortId,
        root: ElementPath,
        recursive: bool,
        listener: Arc<dyn ElementListener>,
    ) -> SourceResult<()>;

    /// Opens the element's content for reading.
    async fn read_data(&self, port: PortId, path: &ElementPath) -> SourceResult<DataReader>;

    /// Opens the element's content for writing.
    async fn write_data(&self, port: PortId, path: &ElementPath) -> SourceResult<DataWriter>;

    /// Moves an element.
    async fn move_element(
        &self,
        port: PortId,
        from: &ElementPath,
        to: &ElementPath,
    ) -> SourceResult<()>;

    /// Deletes an element.
    async fn delete(&self, port: PortId, path: &ElementPath) -> SourceResult<()>;

    /// Creates a folder, returning its snapshot.
    async fn create_folder(&self, port: PortId, path: &ElementPath) -> SourceResult<DataElement>;

    /// Takes an advisory lock on the element.
    async fn check_and_lock(&self, port: PortId, path: &ElementPath) -> SourceResult<()>;

    /// Releases an advisory lock.
    async fn unlock(&self, port: PortId, path: &ElementPath) -> SourceResult<()>;
}

/// Provider-side emission surface.
#[async_trait]
pub trait ProviderSink: Send + Sync {
    /// Emits an element-change notification through a provider port.
    async fn send_element_event(
        &self,
        port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) -> SourceResult<()>;

    /// Reports the provider's availability.
    async fn send_state(&self, port: PortId, flags: ProviderStateFlags) -> SourceResult<()>;
}

/// Hierarchical key/value persistence scoped by (domain, path).
///
/// Backed by the excluded configuration/database layer in production and by
/// [`crate::SettingsStore`] here. Absence of a key means "use defaults".
pub trait ConfigStore: Send + Sync {
    fn get(&self, domain: &str, path: &str) -> crate::BrokerResult<Option<String>>;
    fn set(&self, domain: &str, path: &str, value: &str) -> crate::BrokerResult<()>;
    fn remove(&self, domain: &str, path: &str) -> crate::BrokerResult<()>;
}

/// A [`ProviderSink`] that routes emissions onto the event bus.
///
/// This is the in-core half of provider-side emission: whatever transport a
/// backend module uses to call `send_element_event`, the notification ends
/// up here and fans out to eligible subscribers.
pub struct BusSink {
    module: ModuleId,
    bus: crate::EventBus,
}

impl BusSink {
    /// A sink emitting on behalf of `module`.
    #[must_use]
    pub fn new(module: ModuleId, bus: crate::EventBus) -> Self {
        Self { module, bus }
    }
}

#[async_trait]
impl ProviderSink for BusSink {
    async fn send_element_event(
        &self,
        port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) -> SourceResult<()> {
        self.bus.publish(GeneralEvent::DataElementChange {
            created_ms: crate::now_ms(),
            source_port: port,
            element,
            event_type,
        });
        Ok(())
    }

    async fn send_state(&self, port: PortId, flags: ProviderStateFlags) -> SourceResult<()> {
        self.bus.publish(GeneralEvent::ProviderState {
            created_ms: crate::now_ms(),
            module: self.module,
            port,
            flags,
        });
        Ok(())
    }
}

/// In-memory fakes for testing.
pub mod mock {
    use super::*;
    use portlink_types::ElementKind;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// A scriptable in-memory provider backend.
    ///
    /// Holds a snapshot tree keyed by path. Failures are queued with
    /// [`MockProviderSource::push_failure`] and consumed by the next
    /// fallible call, letting tests script transient/busy sequences.
    #[derive(Default)]
    pub struct MockProviderSource {
        elements: Mutex<BTreeMap<ElementPath, DataElement>>,
        failures: Mutex<VecDeque<SourceError>>,
        fetch_count: Mutex<u64>,
    }

    impl MockProviderSource {
        /// An empty provider.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts or replaces a snapshot.
        pub fn put(&self, element: DataElement) {
            self.elements
                .lock()
                .unwrap()
                .insert(element.path().clone(), element);
        }

        /// Removes a snapshot.
        pub fn remove(&self, path: &ElementPath) {
            self.elements.lock().unwrap().remove(path);
        }

        /// Queues an error for the next fallible call.
        pub fn push_failure(&self, error: SourceError) {
            self.failures.lock().unwrap().push_back(error);
        }

        /// Number of `get_element` calls served so far.
        #[must_use]
        pub fn fetch_count(&self) -> u64 {
            *self.fetch_count.lock().unwrap()
        }

        fn take_failure(&self) -> Option<SourceError> {
            self.failures.lock().unwrap().pop_front()
        }
    }

    #[async_trait]
    impl ProviderSource for MockProviderSource {
        async fn get_element(
            &self,
            _port: PortId,
            path: &ElementPath,
        ) -> SourceResult<DataElement> {
            *self.fetch_count.lock().unwrap() += 1;
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            self.elements
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or(SourceError::NotFound)
        }

        async fn get_child_elements(
            &self,
            _port: PortId,
            path: &ElementPath,
            recursive: bool,
        ) -> SourceResult<Vec<DataElement>> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            let elements = self.elements.lock().unwrap();
            Ok(elements
                .iter()
                .filter(|(candidate, _)| {
                    candidate.starts_with(path)
                        && candidate.depth() > path.depth()
                        && (recursive || candidate.depth() == path.depth() + 1)
                })
                .map(|(_, element)| element.clone())
                .collect())
        }

        async fn subscribe(
            &self,
            _port: PortId,
            _root: ElementPath,
            _recursive: bool,
            _listener: Arc<dyn ElementListener>,
        ) -> SourceResult<()> {
            Ok(())
        }

        async fn read_data(&self, _port: PortId, path: &ElementPath) -> SourceResult<DataReader> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            let elements = self.elements.lock().unwrap();
            match elements.get(path) {
                Some(element) if element.kind() == ElementKind::File => {
                    Ok(Box::new(std::io::Cursor::new(Vec::new())) as DataReader)
                }
                _ => Err(SourceError::NotFound),
            }
        }

        async fn write_data(&self, _port: PortId, _path: &ElementPath) -> SourceResult<DataWriter> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            Ok(Box::new(std::io::Cursor::new(Vec::new())) as DataWriter)
        }

        async fn move_element(
            &self,
            _port: PortId,
            from: &ElementPath,
            to: &ElementPath,
        ) -> SourceResult<()> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            let mut elements = self.elements.lock().unwrap();
            let element = elements.remove(from).ok_or(SourceError::NotFound)?;
            let moved = DataElement::new(
                to.clone(),
                element.kind(),
                element.size(),
                element.modified_ms(),
            );
            elements.insert(to.clone(), moved);
            Ok(())
        }

        async fn delete(&self, _port: PortId, path: &ElementPath) -> SourceResult<()> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            self.elements
                .lock()
                .unwrap()
                .remove(path)
                .map(|_| ())
                .ok_or(SourceError::NotFound)
        }

        async fn create_folder(
            &self,
            _port: PortId,
            path: &ElementPath,
        ) -> SourceResult<DataElement> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            let folder = DataElement::folder(path.clone(), 0);
            self.elements
                .lock()
                .unwrap()
                .insert(path.clone(), folder.clone());
            Ok(folder)
        }

        async fn check_and_lock(&self, _port: PortId, _path: &ElementPath) -> SourceResult<()> {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            Ok(())
        }

        async fn unlock(&self, _port: PortId, _path: &ElementPath) -> SourceResult<()> {
            Ok(())
        }
    }

    /// A module recording its lifecycle calls.
    #[derive(Default)]
    pub struct MockModule {
        calls: Mutex<Vec<String>>,
        ready: AtomicBool,
    }

    impl MockModule {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The lifecycle calls seen so far, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl ModuleLifecycle for MockModule {
        async fn initialize(&self) -> SourceResult<()> {
            self.record("initialize");
            Ok(())
        }

        async fn enter_startup(&self) {
            self.record("enter_startup");
        }

        async fn exit_startup(&self) {
            self.record("exit_startup");
            self.ready.store(true, Ordering::SeqCst);
        }

        async fn enter_shutdown(&self) {
            self.record("enter_shutdown");
            self.ready.store(false, Ordering::SeqCst);
        }

        async fn exit_shutdown(&self) {
            self.record("exit_shutdown");
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn on_port_connection(&self, port: PortId) {
            self.record(format!("on_port_connection {port}"));
        }

        async fn on_port_disconnection(&self, port: PortId) {
            self.record(format!("on_port_disconnection {port}"));
        }

        async fn on_provider_state(&self, port: PortId, flags: ProviderStateFlags) {
            self.record(format!("on_provider_state {port} {:#x}", flags.bits()));
        }
    }

    /// An in-memory `ConfigStore`.
    #[derive(Default)]
    pub struct MemoryConfigStore {
        entries: Mutex<BTreeMap<(String, String), String>>,
    }

    impl MemoryConfigStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ConfigStore for MemoryConfigStore {
        fn get(&self, domain: &str, path: &str) -> crate::BrokerResult<Option<String>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&(domain.to_string(), path.to_string()))
                .cloned())
        }

        fn set(&self, domain: &str, path: &str, value: &str) -> crate::BrokerResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert((domain.to_string(), path.to_string()), value.to_string());
            Ok(())
        }

        fn remove(&self, domain: &str, path: &str) -> crate::BrokerResult<()> {
            self.entries
                .lock()
                .unwrap()
                .remove(&(domain.to_string(), path.to_string()));
            Ok(())
        }
    }
}
