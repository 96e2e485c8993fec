//! Injectable time source.
//!
//! All scheduler logic takes its notion of "now" and its sleeps from a
//! `Clock`, never from the system directly. Production uses [`SystemClock`];
//! tests drive a [`ManualClock`] forward by hand.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A source of epoch-millis time and suspensions against it.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time as epoch millis.
    fn now_ms(&self) -> u64;

    /// Suspends the caller for roughly `ms` milliseconds. Must be
    /// cancel-safe: dropping the future abandons the sleep.
    async fn sleep_ms(&self, ms: u64);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// A hand-driven clock for deterministic tests.
///
/// `sleep_ms` suspends until [`ManualClock::advance`] has moved the clock
/// past the target instant.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    advanced: Notify,
}

impl ManualClock {
    /// A clock starting at the given instant.
    #[must_use]
    pub fn at(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
            advanced: Notify::new(),
        }
    }

    /// Moves the clock forward, waking pending sleeps.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        let target = self.now_ms().saturating_add(ms);
        loop {
            let notified = self.advanced.notified();
            tokio::pin!(notified);
            // Register interest before the check so an advance between the
            // check and the await is not lost.
            notified.as_mut().enable();
            if self.now_ms() >= target {
                return;
            }
            notified.await;
        }
    }
}
