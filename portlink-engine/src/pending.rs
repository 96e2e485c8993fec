//! The pending-work set.
//!
//! A synchronized map of [`PendingWorkItem`]s keyed by identity, drained in
//! release-time order by the worker pool. The map is the only resource here
//! needing mutual exclusion; every critical section is short and no lock is
//! ever held across an await.
//!
//! Coalescing: inserting under an existing, untaken key atomically replaces
//! the old item. An item taken by a worker leaves the map but its key stays
//! marked in-flight, so no second worker can pick up a fresher item for the
//! same identity until the first attempt concludes — within one identity
//! there is never a stale and a fresh version in flight concurrently.

use crate::clock::Clock;
use crate::retry::RetryPolicy;
use crate::work::{PendingWorkItem, WorkKey};
use portlink_types::PortId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Why an item left the set without being requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `retry_count` exceeded `retry_count_max`.
    Exhausted,
    /// `now` passed `expire_ms`.
    Expired,
    /// A fresher item for the same identity was enqueued while this one was
    /// being processed.
    Superseded,
    /// The source was purged while this item was in flight.
    Cancelled,
}

/// Outcome of reporting a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailDecision {
    /// Requeued with the given release time.
    Requeued { release_ms: u64 },
    /// Removed for good.
    Dropped(DropReason),
}

/// Outcome of postponing an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostponeDecision {
    /// Requeued with the given release time.
    Requeued { release_ms: u64 },
    /// Removed: superseded or cancelled while in flight.
    Dropped(DropReason),
}

#[derive(Default)]
struct PendingInner {
    items: HashMap<WorkKey, PendingWorkItem>,
    in_flight: HashSet<WorkKey>,
    cancelled_in_flight: HashSet<WorkKey>,
}

/// The synchronized pending-work store.
pub struct PendingSet {
    inner: Mutex<PendingInner>,
    notify: Notify,
    token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl PendingSet {
    /// An empty set reading time from the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PendingInner::default()),
            notify: Notify::new(),
            token: CancellationToken::new(),
            clock,
        })
    }

    /// The clock this set schedules against.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Enqueues an item, atomically replacing any untaken item with the
    /// same key (last-writer-wins).
    pub fn insert(&self, key: WorkKey, item: PendingWorkItem) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.items.insert(key, item);
        }
        self.notify.notify_one();
    }

    /// Takes the next eligible item, suspending until one is ready.
    ///
    /// Exactly one worker receives any given item. Wakes promptly both when
    /// a new item undercuts the earliest release time and when the earliest
    /// release time arrives. Returns `None` on shutdown.
    pub async fn take(&self) -> Option<(WorkKey, PendingWorkItem)> {
        loop {
            let notified = self.notify.notified();

            let wait_ms = {
                let mut inner = self.inner.lock().unwrap();
                let now = self.clock.now_ms();

                if let Some(key) = select_eligible(&inner, now) {
                    let item = inner.items.remove(&key).expect("selected key is present");
                    inner.in_flight.insert(key.clone());
                    trace!(path = %key.path, "work item taken");
                    return Some((key, item));
                }

                inner
                    .items
                    .iter()
                    .filter(|(key, _)| !inner.in_flight.contains(key))
                    .map(|(_, item)| item.release_ms.saturating_sub(now))
                    .min()
            };

            match wait_ms {
                Some(ms) => {
                    tokio::select! {
                        _ = self.token.cancelled() => return None,
                        _ = notified => {}
                        _ = self.clock.sleep_ms(ms) => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.token.cancelled() => return None,
                        _ = notified => {}
                    }
                }
            }
        }
    }

    /// Concludes a successful attempt.
    pub fn done(&self, key: &WorkKey) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.in_flight.remove(key);
            inner.cancelled_in_flight.remove(key);
        }
        // A fresher item enqueued during the attempt may now be eligible.
        self.notify.notify_one();
    }

    /// Reports a transient failure, requeueing with backoff or dropping
    /// once the budget or deadline is spent.
    pub fn fail(&self, key: WorkKey, mut item: PendingWorkItem, policy: &RetryPolicy) -> FailDecision {
        let decision = {
            let mut inner = self.inner.lock().unwrap();
            inner.in_flight.remove(&key);

            if inner.cancelled_in_flight.remove(&key) {
                FailDecision::Dropped(DropReason::Cancelled)
            } else if inner.items.contains_key(&key) {
                FailDecision::Dropped(DropReason::Superseded)
            } else {
                let now = self.clock.now_ms();
                item.retry_count += 1;
                if item.retry_count > item.retry_count_max {
                    FailDecision::Dropped(DropReason::Exhausted)
                } else if item.is_expired(now) {
                    FailDecision::Dropped(DropReason::Expired)
                } else {
                    // Past the growth limit the duration freezes: the item
                    // keeps retrying at its last computed cadence.
                    if item.retry_count <= item.backoff_growth_limit {
                        item.last_backoff_ms = policy.backoff_delay_ms(item.retry_count);
                    }
                    let release_ms = now + item.last_backoff_ms;
                    item.release_ms = release_ms;
                    inner.items.insert(key, item);
                    FailDecision::Requeued { release_ms }
                }
            }
        };
        self.notify.notify_one();
        decision
    }

    /// Defers an item without charging its retry budget. Used when a
    /// dependency reports itself busy rather than failed; postponement
    /// never expires an item early.
    pub fn postpone(
        &self,
        key: WorkKey,
        mut item: PendingWorkItem,
        policy: &RetryPolicy,
    ) -> PostponeDecision {
        let decision = {
            let mut inner = self.inner.lock().unwrap();
            inner.in_flight.remove(&key);

            if inner.cancelled_in_flight.remove(&key) {
                PostponeDecision::Dropped(DropReason::Cancelled)
            } else if inner.items.contains_key(&key) {
                PostponeDecision::Dropped(DropReason::Superseded)
            } else {
                let release_ms = self.clock.now_ms() + policy.postpone_delay_ms;
                item.release_ms = release_ms;
                inner.items.insert(key, item);
                PostponeDecision::Requeued { release_ms }
            }
        };
        self.notify.notify_one();
        decision
    }

    /// Discards all pending work for a source port, without failure or
    /// expiry side effects. In-flight attempts for the port conclude
    /// silently.
    pub fn purge_source(&self, source_port: PortId) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<WorkKey> = inner
            .items
            .keys()
            .filter(|key| key.source_port == source_port)
            .cloned()
            .collect();
        for key in &stale {
            inner.items.remove(key);
        }
        let in_flight: Vec<WorkKey> = inner
            .in_flight
            .iter()
            .filter(|key| key.source_port == source_port)
            .cloned()
            .collect();
        for key in in_flight {
            inner.cancelled_in_flight.insert(key);
        }
        stale.len()
    }

    /// Number of pending (untaken) items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Whether no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an untaken item exists for the key.
    #[must_use]
    pub fn contains(&self, key: &WorkKey) -> bool {
        self.inner.lock().unwrap().items.contains_key(key)
    }

    /// A snapshot of the pending item for a key, if any.
    #[must_use]
    pub fn get(&self, key: &WorkKey) -> Option<PendingWorkItem> {
        self.inner.lock().unwrap().items.get(key).cloned()
    }

    /// Signals every blocked `take()` to return `None`.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Picks the best eligible key: deepest path first, then lexicographic
/// ascending by segments, then ascending source port id. Leaf-level changes
/// drain before their ancestors.
fn select_eligible(inner: &PendingInner, now_ms: u64) -> Option<WorkKey> {
    inner
        .items
        .iter()
        .filter(|(key, item)| item.is_ready(now_ms) && !inner.in_flight.contains(key))
        .map(|(key, _)| key)
        .min_by(|a, b| {
            b.path
                .depth()
                .cmp(&a.path.depth())
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.source_port.cmp(&b.source_port))
        })
        .cloned()
}
