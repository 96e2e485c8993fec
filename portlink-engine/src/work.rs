//! Pending work items.
//!
//! A work item records one not-yet-performed propagation for an element.
//! Its identity is (source port, path): a burst of notifications for the
//! same path on the same port collapses into a single item carrying the
//! latest snapshot.

use portlink_types::{DataElement, ElementEventType, ElementPath, PortId};

/// Default retry budget before an item is dropped.
pub const DEFAULT_RETRY_COUNT_MAX: u32 = 50;

/// Default number of retries after which the backoff stops growing.
pub const DEFAULT_BACKOFF_GROWTH_LIMIT: u32 = 4;

/// Scheduler identity of a pending item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkKey {
    pub source_port: PortId,
    pub path: ElementPath,
}

impl WorkKey {
    #[must_use]
    pub fn new(source_port: PortId, path: ElementPath) -> Self {
        Self { source_port, path }
    }
}

/// One not-yet-performed unit of propagation work.
#[derive(Debug, Clone)]
pub struct PendingWorkItem {
    /// Latest snapshot of the element the work is about.
    pub element: DataElement,
    /// The change that triggered the item.
    pub event_type: ElementEventType,
    /// When the item was created, epoch millis.
    pub created_ms: u64,
    /// Earliest eligible processing time, epoch millis.
    pub release_ms: u64,
    /// Transient failures so far.
    pub retry_count: u32,
    /// Budget: the item is dropped once `retry_count` exceeds this.
    pub retry_count_max: u32,
    /// Retries after which the backoff duration stops growing.
    pub backoff_growth_limit: u32,
    /// Hard deadline, epoch millis; `None` means never.
    pub expire_ms: Option<u64>,
    /// The item only settles a burst; it performs no transfer.
    pub debounce_only: bool,
    /// The backoff duration last computed, frozen once the growth limit is
    /// exceeded.
    pub(crate) last_backoff_ms: u64,
}

impl PendingWorkItem {
    /// An immediately-eligible item with default retry limits.
    #[must_use]
    pub fn new(element: DataElement, event_type: ElementEventType, now_ms: u64) -> Self {
        Self {
            element,
            event_type,
            created_ms: now_ms,
            release_ms: now_ms,
            retry_count: 0,
            retry_count_max: DEFAULT_RETRY_COUNT_MAX,
            backoff_growth_limit: DEFAULT_BACKOFF_GROWTH_LIMIT,
            expire_ms: None,
            debounce_only: false,
            last_backoff_ms: 0,
        }
    }

    /// Sets the earliest eligible processing time.
    #[must_use]
    pub fn with_release_ms(mut self, release_ms: u64) -> Self {
        self.release_ms = release_ms;
        self
    }

    /// Sets a hard expiry deadline.
    #[must_use]
    pub fn with_expire_ms(mut self, expire_ms: u64) -> Self {
        self.expire_ms = Some(expire_ms);
        self
    }

    /// Overrides the retry budget.
    #[must_use]
    pub fn with_retry_count_max(mut self, retry_count_max: u32) -> Self {
        self.retry_count_max = retry_count_max;
        self
    }

    /// Overrides the backoff growth limit.
    #[must_use]
    pub fn with_backoff_growth_limit(mut self, limit: u32) -> Self {
        self.backoff_growth_limit = limit;
        self
    }

    /// Marks the item as burst-settling only.
    #[must_use]
    pub fn debounce_only(mut self) -> Self {
        self.debounce_only = true;
        self
    }

    /// Whether the item is eligible at `now_ms`.
    #[must_use]
    pub fn is_ready(&self, now_ms: u64) -> bool {
        self.release_ms <= now_ms
    }

    /// Whether the item has outlived its deadline.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expire_ms.is_some_and(|deadline| now_ms > deadline)
    }
}
