//! Retry policy knobs and the backoff schedule.

use crate::work::{DEFAULT_BACKOFF_GROWTH_LIMIT, DEFAULT_RETRY_COUNT_MAX};
use portlink_broker::{BrokerResult, ConfigStore};
use rand::Rng;
use tracing::warn;

/// Configuration domain the knobs are persisted under.
pub const CONFIG_DOMAIN: &str = "scheduler";

/// Tunable knobs of the retry/debounce engine.
///
/// Persisted through the [`ConfigStore`] contract; absence of a key means
/// the default applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deterministic backoff unit per retry.
    pub base_delay_ms: u64,
    /// Retry budget before an item is dropped.
    pub retry_count_max: u32,
    /// Retries after which the backoff duration stops growing.
    pub backoff_growth_limit: u32,
    /// Fixed deferral for transiently busy dependencies.
    pub postpone_delay_ms: u64,
    /// Debounce settle window.
    pub settle_window_ms: u64,
    /// Size of the worker pool.
    pub worker_count: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            retry_count_max: DEFAULT_RETRY_COUNT_MAX,
            backoff_growth_limit: DEFAULT_BACKOFF_GROWTH_LIMIT,
            postpone_delay_ms: 5000,
            settle_window_ms: 5000,
            worker_count: 4,
        }
    }
}

impl RetryPolicy {
    /// Loads the policy from the configuration store.
    ///
    /// Missing keys fall back to defaults; unparseable values are logged
    /// and defaulted. Storage failures propagate — configuration layer
    /// errors are fatal, not retried.
    pub fn load(store: &dyn ConfigStore) -> BrokerResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            base_delay_ms: read_u64(store, "base_delay_ms", defaults.base_delay_ms)?,
            retry_count_max: read_u64(store, "retry_count_max", defaults.retry_count_max as u64)?
                as u32,
            backoff_growth_limit: read_u64(
                store,
                "backoff_growth_limit",
                defaults.backoff_growth_limit as u64,
            )? as u32,
            postpone_delay_ms: read_u64(store, "postpone_delay_ms", defaults.postpone_delay_ms)?,
            settle_window_ms: read_u64(store, "settle_window_ms", defaults.settle_window_ms)?,
            worker_count: read_u64(store, "worker_count", defaults.worker_count as u64)? as usize,
        })
    }

    /// Backoff duration for the `k`-th retry (k ≥ 1), while k is within the
    /// growth limit: `k * base + uniform(0, k * base)`.
    ///
    /// The jitter is strictly below the deterministic component, so retries
    /// spread out without reordering roughly-proportional-to-k delays.
    #[must_use]
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        let deterministic = u64::from(retry_count) * self.base_delay_ms;
        if deterministic == 0 {
            return 0;
        }
        deterministic + rand::thread_rng().gen_range(0..deterministic)
    }
}

fn read_u64(store: &dyn ConfigStore, key: &str, default: u64) -> BrokerResult<u64> {
    match store.get(CONFIG_DOMAIN, key)? {
        None => Ok(default),
        Some(raw) => match raw.parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(key, raw, "unparseable scheduler knob, using default");
                Ok(default)
            }
        },
    }
}
