//! The coalescing event bus.
//!
//! Subscribers receive events through per-subscriber queues. A mergeable
//! event replaces an older undelivered event with the same subject in place,
//! keeping its queue position, so a burst of topology churn never grows a
//! queue beyond one entry per subject. Non-mergeable events append.
//!
//! Delivery is rights-gated: an event is silently withheld from any
//! subscriber whose mask lacks the event's required bit. Subscribers holding
//! `MAY_MISS_EVENTS` get a bounded backlog and lose the oldest entry on
//! overflow; all others get an unbounded queue — the bus never drops on
//! them, backpressure is the publisher's concern.

use portlink_types::{EventKind, GeneralEvent, Rights, SubscriberId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::warn;

/// Backlog cap for subscribers that may miss events.
pub const DEFAULT_LOSSY_BACKLOG: usize = 1024;

struct Subscriber {
    rights: Rights,
    /// `None` delivers every kind the rights allow.
    kinds: Option<HashSet<EventKind>>,
    queue: VecDeque<GeneralEvent>,
    /// `Some` for MAY_MISS_EVENTS holders.
    max_backlog: Option<usize>,
    notify: Arc<Notify>,
}

struct BusInner {
    subscribers: HashMap<SubscriberId, Subscriber>,
    closed: bool,
}

/// Publish/subscribe hub with per-subscriber coalescing queues.
///
/// Cheap to clone; clones share the subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Creates an open bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: HashMap::new(),
                closed: false,
            })),
        }
    }

    /// Registers a subscriber receiving every event its rights allow.
    pub fn subscribe(&self, rights: Rights) -> EventSubscription {
        self.subscribe_inner(rights, None)
    }

    /// Registers a subscriber limited to the given event kinds.
    pub fn subscribe_filtered(
        &self,
        rights: Rights,
        kinds: impl IntoIterator<Item = EventKind>,
    ) -> EventSubscription {
        self.subscribe_inner(rights, Some(kinds.into_iter().collect()))
    }

    fn subscribe_inner(
        &self,
        rights: Rights,
        kinds: Option<HashSet<EventKind>>,
    ) -> EventSubscription {
        let id = SubscriberId::new();
        let notify = Arc::new(Notify::new());
        let max_backlog = rights
            .contains(Rights::MAY_MISS_EVENTS)
            .then_some(DEFAULT_LOSSY_BACKLOG);

        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.insert(
            id,
            Subscriber {
                rights,
                kinds,
                queue: VecDeque::new(),
                max_backlog,
                notify: notify.clone(),
            },
        );

        EventSubscription {
            id,
            inner: self.inner.clone(),
            notify,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    /// Fans an event out to every eligible subscriber.
    ///
    /// Short and non-blocking: producers only pay for the coalescing
    /// replace step under the lock.
    pub fn publish(&self, event: GeneralEvent) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }

        let subject = event.subject();
        let required = event.required_right();
        let kind = event.kind();

        for sub in inner.subscribers.values_mut() {
            if !sub.rights.contains(required) {
                continue;
            }
            if let Some(kinds) = &sub.kinds {
                if !kinds.contains(&kind) {
                    continue;
                }
            }

            if let Some(subject) = subject {
                if let Some(slot) = sub
                    .queue
                    .iter_mut()
                    .find(|queued| queued.subject() == Some(subject))
                {
                    // Same pending notification: newest payload wins,
                    // queue position is preserved.
                    *slot = event.clone();
                    sub.notify.notify_one();
                    continue;
                }
            }

            if let Some(cap) = sub.max_backlog {
                if sub.queue.len() >= cap {
                    let dropped = sub.queue.pop_front();
                    warn!(
                        backlog = cap,
                        kind = ?dropped.as_ref().map(GeneralEvent::kind),
                        "lossy subscriber backlog full, dropping oldest event"
                    );
                }
            }
            sub.queue.push_back(event.clone());
            sub.notify.notify_one();
        }
    }

    /// Closes the bus. Pending queues drain; further publishes are ignored
    /// and `recv` returns `None` once a queue is empty.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        for sub in inner.subscribers.values() {
            sub.notify.notify_one();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription handle. Dropping it unsubscribes.
pub struct EventSubscription {
    id: SubscriberId,
    inner: Arc<Mutex<BusInner>>,
    notify: Arc<Notify>,
}

impl EventSubscription {
    /// The subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receives the next event, suspending until one is queued.
    ///
    /// Returns `None` once the bus is closed and the backlog is drained.
    pub async fn recv(&self) -> Option<GeneralEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                let closed = inner.closed;
                let sub = inner.subscribers.get_mut(&self.id)?;
                if let Some(event) = sub.queue.pop_front() {
                    return Some(event);
                }
                if closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<GeneralEvent> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .get_mut(&self.id)
            .and_then(|sub| sub.queue.pop_front())
    }

    /// Number of undelivered events.
    #[must_use]
    pub fn backlog(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .get(&self.id)
            .map_or(0, |sub| sub.queue.len())
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.inner.lock().unwrap().subscribers.remove(&self.id);
    }
}
