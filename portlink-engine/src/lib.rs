//! Delayed-retry scheduling engine for PortLink.
//!
//! Drives reliable propagation of change notifications between modules. The
//! engine keeps a set of pending work items keyed by (source port, path),
//! ordered by release time, and drained by a fixed pool of workers. A burst
//! of notifications for one path collapses into a single pending item; a
//! failing backend earns growing, jittered backoff; a merely busy backend
//! earns postponement that never touches the retry budget.
//!
//! # Components
//!
//! - **Clock**: injectable time source — scheduler logic never reads the
//!   wall clock directly, so backoff and expiry are deterministic under test
//! - **Pending set**: the synchronized, coalescing, time-ordered work store
//! - **Scheduler**: the worker pool classifying processing outcomes into
//!   retry, postpone, or drop decisions
//! - **Debounce pipeline**: settles bursts of upstream change events before
//!   forwarding a single consolidated notification downstream, excluding
//!   writes the pipeline itself caused

mod clock;
mod debounce;
mod pending;
mod retry;
mod scheduler;
mod work;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::{DebounceForwarder, Downstream};
pub use pending::{DropReason, FailDecision, PendingSet, PostponeDecision};
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, WorkOutcome, WorkProcessor};
pub use work::{PendingWorkItem, WorkKey};
