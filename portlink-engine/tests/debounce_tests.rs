use async_trait::async_trait;
use portlink_broker::contracts::mock::MockProviderSource;
use portlink_broker::{EventBus, SourceError, SourceResult};
use portlink_engine::{
    DebounceForwarder, Downstream, ManualClock, PendingSet, RetryPolicy, Scheduler, SystemClock,
    WorkKey,
};
use portlink_types::{DataElement, ElementEventType, ElementPath, ModuleId, PortId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

fn path(segments: &[&str]) -> ElementPath {
    ElementPath::new(segments.iter().copied()).unwrap()
}

/// Records every forwarded notification; optionally fails each attempt.
#[derive(Default)]
struct RecordingDownstream {
    forwarded: Mutex<Vec<(PortId, DataElement, ElementEventType)>>,
    fail: AtomicBool,
}

impl RecordingDownstream {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn count(&self) -> usize {
        self.forwarded.lock().unwrap().len()
    }

    fn last(&self) -> Option<(PortId, DataElement, ElementEventType)> {
        self.forwarded.lock().unwrap().last().cloned()
    }

    async fn wait_for(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            while self.count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("downstream never received the expected notifications");
    }
}

#[async_trait]
impl Downstream for RecordingDownstream {
    async fn forward(
        &self,
        source_port: PortId,
        element: DataElement,
        event_type: ElementEventType,
    ) -> SourceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Io("route unavailable".into()));
        }
        self.forwarded
            .lock()
            .unwrap()
            .push((source_port, element, event_type));
        Ok(())
    }
}

/// Millisecond-scale windows so real sleeps stay short.
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base_delay_ms: 5,
        retry_count_max: 50,
        backoff_growth_limit: 4,
        postpone_delay_ms: 10,
        settle_window_ms: 30,
        worker_count: 2,
    }
}

fn spawn_pipeline(
    source: Arc<MockProviderSource>,
    downstream: Arc<RecordingDownstream>,
) -> (Arc<DebounceForwarder>, Scheduler) {
    let pending = PendingSet::new(Arc::new(SystemClock));
    DebounceForwarder::spawn(
        ModuleId::new(),
        source,
        downstream,
        pending,
        fast_policy(),
        EventBus::new(),
    )
}

// ── Self-write suppression ───────────────────────────────────────

#[tokio::test]
async fn notifications_for_written_paths_are_discarded() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();
    let pending = PendingSet::new(Arc::new(ManualClock::at(0)));
    let forwarder = DebounceForwarder::new(source, downstream, pending.clone(), 5_000);

    let target = path(&["docs", "out.txt"]);
    let element = DataElement::file(target.clone(), 10, 100);

    forwarder.begin_write(target.clone());
    forwarder.notify_change(PortId::new(), element.clone(), ElementEventType::Modified);
    // Never enqueued as a debounce item.
    assert!(pending.is_empty());

    forwarder.finish_write(&target);
    assert!(!forwarder.is_writing(&target));
    forwarder.notify_change(PortId::new(), element, ElementEventType::Modified);
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn other_paths_flow_while_one_is_being_written() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();
    let pending = PendingSet::new(Arc::new(ManualClock::at(0)));
    let forwarder = DebounceForwarder::new(source, downstream, pending.clone(), 5_000);

    forwarder.begin_write(path(&["docs", "busy.txt"]));
    forwarder.notify_change(
        PortId::new(),
        DataElement::file(path(&["docs", "other.txt"]), 1, 1),
        ElementEventType::Created,
    );
    assert_eq!(pending.len(), 1);
}

// ── Window semantics ─────────────────────────────────────────────

#[tokio::test]
async fn a_second_notification_restarts_the_window() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();
    let clock = Arc::new(ManualClock::at(10_000));
    let pending = PendingSet::new(clock.clone());
    let forwarder = DebounceForwarder::new(source, downstream, pending.clone(), 5_000);

    let port = PortId::new();
    let target = path(&["docs", "report.txt"]);
    let key = WorkKey::new(port, target.clone());

    forwarder.notify_change(
        port,
        DataElement::file(target.clone(), 1, 1),
        ElementEventType::Modified,
    );
    assert_eq!(pending.get(&key).unwrap().release_ms, 15_000);

    // 2000 ms later a fresh notification arrives: one pending item,
    // carrying the latest snapshot, window restarted.
    clock.advance(2_000);
    forwarder.notify_change(
        port,
        DataElement::file(target, 2, 2),
        ElementEventType::Modified,
    );
    assert_eq!(pending.len(), 1);
    let item = pending.get(&key).unwrap();
    assert_eq!(item.release_ms, 17_000);
    assert_eq!(item.element.size(), 2);
    assert!(item.debounce_only);
}

// ── End-to-end forwarding ────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settled_burst_forwards_exactly_once() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();

    let port = PortId::new();
    let target = path(&["docs", "report.txt"]);
    let settled = DataElement::file(target.clone(), 2, 200);
    source.put(settled.clone());

    let (forwarder, scheduler) = spawn_pipeline(source, downstream.clone());

    // A burst of two notifications; the second carries the final snapshot.
    forwarder.notify_change(
        port,
        DataElement::file(target.clone(), 1, 100),
        ElementEventType::Modified,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    forwarder.notify_change(port, settled.clone(), ElementEventType::Modified);

    downstream.wait_for(1).await;
    let (forwarded_port, element, event_type) = downstream.last().unwrap();
    assert_eq!(forwarded_port, port);
    assert_eq!(element, settled);
    assert_eq!(event_type, ElementEventType::Modified);

    // Quiet afterwards: exactly one consolidated notification.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(downstream.count(), 1);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn changed_snapshot_restarts_instead_of_forwarding() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();

    let port = PortId::new();
    let target = path(&["docs", "report.txt"]);
    // The authoritative snapshot has moved past the notified one.
    let newest = DataElement::file(target.clone(), 9, 900);
    source.put(newest.clone());

    let (forwarder, scheduler) = spawn_pipeline(source, downstream.clone());

    forwarder.notify_change(
        port,
        DataElement::file(target, 1, 100),
        ElementEventType::Modified,
    );

    // The first window must not forward the stale snapshot; the restarted
    // one forwards the newest.
    downstream.wait_for(1).await;
    let (_, element, _) = downstream.last().unwrap();
    assert_eq!(element, newest);
    assert_eq!(downstream.count(), 1);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_element_forwards_a_deletion() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();

    let port = PortId::new();
    let target = path(&["docs", "gone.txt"]);
    // Nothing at the path: the provider reports NotFound.

    let (forwarder, scheduler) = spawn_pipeline(source, downstream.clone());

    forwarder.notify_change(
        port,
        DataElement::nonexistent(target.clone()),
        ElementEventType::Deleted,
    );

    downstream.wait_for(1).await;
    let (_, element, event_type) = downstream.last().unwrap();
    assert_eq!(event_type, ElementEventType::Deleted);
    assert!(!element.exists());
    assert_eq!(element.path(), &target);

    scheduler.shutdown().await;
}

// ── Failure classification ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_backend_postpones_then_forwards() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();

    let port = PortId::new();
    let target = path(&["docs", "slow.txt"]);
    let element = DataElement::file(target, 3, 300);
    source.put(element.clone());
    source.push_failure(SourceError::Busy);

    let (forwarder, scheduler) = spawn_pipeline(source.clone(), downstream.clone());
    forwarder.notify_change(port, element.clone(), ElementEventType::Modified);

    downstream.wait_for(1).await;
    assert_eq!(downstream.last().unwrap().1, element);
    // First fetch hit Busy, the postponed attempt succeeded.
    assert_eq!(source.fetch_count(), 2);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_failures_back_off_then_forward() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();

    let port = PortId::new();
    let target = path(&["docs", "flaky.txt"]);
    let element = DataElement::file(target, 4, 400);
    source.put(element.clone());
    source.push_failure(SourceError::Transient("cloud hiccup".into()));
    source.push_failure(SourceError::Transient("cloud hiccup".into()));

    let (forwarder, scheduler) = spawn_pipeline(source, downstream.clone());
    forwarder.notify_change(port, element.clone(), ElementEventType::Modified);

    downstream.wait_for(1).await;
    assert_eq!(downstream.last().unwrap().1, element);

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn routing_errors_drop_the_notification() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();
    downstream.fail.store(true, Ordering::SeqCst);

    let port = PortId::new();
    let target = path(&["docs", "unroutable.txt"]);
    let element = DataElement::file(target.clone(), 5, 500);
    source.put(element.clone());

    let (forwarder, scheduler) = spawn_pipeline(source, downstream.clone());
    forwarder.notify_change(port, element, ElementEventType::Modified);

    // Forwarding is best-effort: the failed notification is not retried.
    timeout(Duration::from_secs(5), async {
        while !scheduler.pending().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("the settle window should drain");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(downstream.count(), 0);
    assert_eq!(forwarder.purge_source(port), 0);

    scheduler.shutdown().await;
}

// ── Cancellation ─────────────────────────────────────────────────

#[tokio::test]
async fn purge_discards_pending_windows() {
    let source = Arc::new(MockProviderSource::new());
    let downstream = RecordingDownstream::new();
    let pending = PendingSet::new(Arc::new(ManualClock::at(0)));
    let forwarder = DebounceForwarder::new(source, downstream, pending.clone(), 5_000);

    let port = PortId::new();
    forwarder.notify_change(
        port,
        DataElement::file(path(&["a"]), 1, 1),
        ElementEventType::Modified,
    );
    forwarder.notify_change(
        port,
        DataElement::file(path(&["b"]), 1, 1),
        ElementEventType::Modified,
    );

    assert_eq!(forwarder.purge_source(port), 2);
    assert!(pending.is_empty());
}
