//! The debounce forwarding pipeline.
//!
//! Settles bursts of upstream change events before forwarding a single
//! consolidated notification downstream. Each notification opens (or
//! restarts) a settle window for its path; when the window elapses the
//! current authoritative snapshot is re-fetched and forwarded only if the
//! burst has actually settled. Notifications for paths the pipeline is
//! itself writing are discarded before any work item exists, so a write
//! caused by the engine can never re-trigger itself.
//!
//! Per path: Idle → Debouncing on notification; Debouncing → Debouncing on
//! coalesce; Debouncing → Idle on forward or supersede.

use crate::clock::Clock;
use crate::pending::PendingSet;
use crate::retry::RetryPolicy;
use crate::scheduler::{Scheduler, WorkOutcome, WorkProcessor};
use crate::work::{PendingWorkItem, WorkKey};
use async_trait::async_trait;
use portlink_broker::{
    BusSink, ElementListener, EventBus, ProviderSink, ProviderSource, SourceError, SourceResult,
};
use portlink_types::{DataElement, ElementEventType, ElementPath, ModuleId, PortId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Receives consolidated notifications once a burst has settled.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn forward(
        &self,
        source_port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) -> SourceResult<()>;
}

// Forwarding downstream is provider-side emission: the bus sink routes the
// consolidated notification out through the general event stream.
#[async_trait]
impl Downstream for BusSink {
    async fn forward(
        &self,
        source_port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) -> SourceResult<()> {
        self.send_element_event(source_port, element, event_type).await
    }
}

/// Settles element-change bursts and forwards them downstream.
pub struct DebounceForwarder {
    source: Arc<dyn ProviderSource>,
    downstream: Arc<dyn Downstream>,
    pending: Arc<PendingSet>,
    clock: Arc<dyn Clock>,
    /// Paths this pipeline is currently writing out. Written by the
    /// writer-completion callback, read by the notification intake.
    writing: Mutex<HashSet<ElementPath>>,
    settle_window_ms: u64,
}

impl DebounceForwarder {
    /// Builds a pipeline over an existing pending set.
    #[must_use]
    pub fn new(
        source: Arc<dyn ProviderSource>,
        downstream: Arc<dyn Downstream>,
        pending: Arc<PendingSet>,
        settle_window_ms: u64,
    ) -> Arc<Self> {
        let clock = pending.clock().clone();
        Arc::new(Self {
            source,
            downstream,
            pending,
            clock,
            writing: Mutex::new(HashSet::new()),
            settle_window_ms,
        })
    }

    /// Builds a pipeline and starts its worker pool in one step.
    #[must_use]
    pub fn spawn(
        module: ModuleId,
        source: Arc<dyn ProviderSource>,
        downstream: Arc<dyn Downstream>,
        pending: Arc<PendingSet>,
        policy: RetryPolicy,
        bus: EventBus,
    ) -> (Arc<Self>, Scheduler) {
        let forwarder = Self::new(source, downstream, pending.clone(), policy.settle_window_ms);
        let scheduler = Scheduler::start(module, pending, forwarder.clone(), policy, bus);
        (forwarder, scheduler)
    }

    /// Intake for upstream change notifications.
    ///
    /// A notification for a path currently being written by this pipeline
    /// is discarded. Anything else opens or restarts the path's settle
    /// window, the pending item coalescing to the latest snapshot.
    pub fn notify_change(
        &self,
        source_port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) {
        if self.writing.lock().unwrap().contains(element.path()) {
            debug!(path = %element.path(), "self-write suppressed");
            return;
        }

        let now = self.clock.now_ms();
        let key = WorkKey::new(source_port, element.path().clone());
        let item = PendingWorkItem::new(element, event_type, now)
            .debounce_only()
            .with_release_ms(now + self.settle_window_ms);
        self.pending.insert(key, item);
    }

    /// Marks a path as being written by this pipeline. Notifications for it
    /// are discarded until [`DebounceForwarder::finish_write`].
    pub fn begin_write(&self, path: ElementPath) {
        self.writing.lock().unwrap().insert(path);
    }

    /// Writer-completion callback: the path's notifications flow again.
    pub fn finish_write(&self, path: &ElementPath) {
        self.writing.lock().unwrap().remove(path);
    }

    /// Whether the pipeline is currently writing the path.
    #[must_use]
    pub fn is_writing(&self, path: &ElementPath) -> bool {
        self.writing.lock().unwrap().contains(path)
    }

    /// Discards all pending work for a source port (disconnection).
    pub fn purge_source(&self, source_port: PortId) -> usize {
        self.pending.purge_source(source_port)
    }

    /// Re-enqueues a fresh settle window carrying the given snapshot.
    fn restart_window(&self, key: &WorkKey, element: DataElement) {
        let event_type = if element.exists() {
            ElementEventType::Modified
        } else {
            ElementEventType::Deleted
        };
        let now = self.clock.now_ms();
        let item = PendingWorkItem::new(element, event_type, now)
            .debounce_only()
            .with_release_ms(now + self.settle_window_ms);
        self.pending.insert(key.clone(), item);
    }
}

// The pipeline plugs straight into `ProviderSource::subscribe` as the
// change listener.
#[async_trait]
impl ElementListener for DebounceForwarder {
    async fn on_element_event(
        &self,
        port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) {
        self.notify_change(port, element, event_type);
    }
}

#[async_trait]
impl WorkProcessor for DebounceForwarder {
    async fn process(&self, key: &WorkKey, item: &PendingWorkItem) -> WorkOutcome {
        // The window elapsed; re-validate against the authoritative state.
        let current = match self.source.get_element(key.source_port, &key.path).await {
            Ok(element) => element,
            Err(SourceError::NotFound) => DataElement::nonexistent(key.path.clone()),
            Err(SourceError::Busy) => return WorkOutcome::Busy,
            Err(SourceError::Transient(cause)) => return WorkOutcome::Transient(cause),
            Err(other) => return WorkOutcome::Fatal(other.to_string()),
        };

        if current != item.element {
            // Still changing: treat as a new burst, do not forward.
            debug!(path = %key.path, "snapshot changed during settle window, restarting");
            self.restart_window(key, current);
            return WorkOutcome::Done;
        }

        // Settled. Forwarding is best-effort: routing errors are logged and
        // the notification is dropped, not retried.
        if let Err(error) = self
            .downstream
            .forward(key.source_port, current, item.event_type)
            .await
        {
            warn!(path = %key.path, %error, "forwarding failed, notification dropped");
        }
        WorkOutcome::Done
    }
}
