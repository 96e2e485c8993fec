//! The worker pool.
//!
//! A fixed number of workers drain the pending set. Each worker takes one
//! item at a time, runs the processor with no scheduler lock held, and maps
//! the outcome onto the set: done, retry with backoff, postpone, or drop.
//! Business failures never escape the loop — they become decisions. Dropped
//! work is reported as a module-activity event, never as a hard error to
//! the original caller.

use crate::pending::{DropReason, FailDecision, PendingSet, PostponeDecision};
use crate::retry::RetryPolicy;
use crate::work::{PendingWorkItem, WorkKey};
use async_trait::async_trait;
use portlink_broker::EventBus;
use portlink_types::{GeneralEvent, ModuleId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// What processing one item concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The work is finished.
    Done,
    /// The backend failed transiently; retry with backoff.
    Transient(String),
    /// The backend is busy; postpone without charging the retry budget.
    Busy,
    /// Unrecoverable for this item; drop it and log.
    Fatal(String),
}

/// Processes taken work items.
#[async_trait]
pub trait WorkProcessor: Send + Sync {
    async fn process(&self, key: &WorkKey, item: &PendingWorkItem) -> WorkOutcome;
}

/// A fixed-size pool of workers draining a [`PendingSet`].
pub struct Scheduler {
    pending: Arc<PendingSet>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns `policy.worker_count` workers.
    ///
    /// `module` identifies the owner in activity events published to `bus`
    /// when work is dropped.
    #[must_use]
    pub fn start(
        module: ModuleId,
        pending: Arc<PendingSet>,
        processor: Arc<dyn WorkProcessor>,
        policy: RetryPolicy,
        bus: EventBus,
    ) -> Self {
        let workers = (0..policy.worker_count.max(1))
            .map(|worker| {
                let pending = pending.clone();
                let processor = processor.clone();
                let policy = policy.clone();
                let bus = bus.clone();
                tokio::spawn(async move {
                    worker_loop(worker, module, pending, processor, policy, bus).await;
                })
            })
            .collect();

        Self { pending, workers }
    }

    /// The pending set this pool drains.
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingSet> {
        &self.pending
    }

    /// Stops the pool: interrupts blocked takes and joins every worker.
    pub async fn shutdown(self) {
        self.pending.shutdown();
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    worker: usize,
    module: ModuleId,
    pending: Arc<PendingSet>,
    processor: Arc<dyn WorkProcessor>,
    policy: RetryPolicy,
    bus: EventBus,
) {
    while let Some((key, item)) = pending.take().await {
        let outcome = processor.process(&key, &item).await;
        match outcome {
            WorkOutcome::Done => {
                pending.done(&key);
                debug!(worker, path = %key.path, "work item completed");
            }
            WorkOutcome::Busy => match pending.postpone(key.clone(), item, &policy) {
                PostponeDecision::Requeued { release_ms } => {
                    debug!(worker, path = %key.path, release_ms, "work item postponed");
                }
                PostponeDecision::Dropped(reason) => {
                    debug!(worker, path = %key.path, ?reason, "postponed item dropped");
                }
            },
            WorkOutcome::Transient(cause) => {
                match pending.fail(key.clone(), item, &policy) {
                    FailDecision::Requeued { release_ms } => {
                        debug!(
                            worker,
                            path = %key.path,
                            release_ms,
                            cause,
                            "work item requeued with backoff"
                        );
                    }
                    FailDecision::Dropped(reason) => {
                        report_drop(&bus, module, &key, reason, &cause);
                    }
                }
            }
            WorkOutcome::Fatal(cause) => {
                pending.done(&key);
                error!(worker, path = %key.path, cause, "work item failed fatally, dropped");
            }
        }
    }
    debug!(worker, "worker stopped");
}

fn report_drop(bus: &EventBus, module: ModuleId, key: &WorkKey, reason: DropReason, cause: &str) {
    match reason {
        DropReason::Exhausted | DropReason::Expired => {
            warn!(path = %key.path, ?reason, cause, "work item dropped");
            bus.publish(GeneralEvent::ModuleActivity {
                created_ms: portlink_broker::now_ms(),
                module,
                activity: format!("dropped work for {}: {reason:?}", key.path),
            });
        }
        DropReason::Superseded | DropReason::Cancelled => {
            debug!(path = %key.path, ?reason, "stale work item dropped");
        }
    }
}
