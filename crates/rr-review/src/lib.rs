//! rusty-reviewer/crates/rr-review/src/lib.rs
//!
//! The review pipeline: per-level registries, lazy runner activation, the
//! checker middleware chain and the executors that apply punishments.

pub mod activation;
pub mod checker;
pub mod executor;
pub mod filter;
pub mod middleware;
pub mod perf;
pub mod pipeline;
pub mod producer;
pub mod registry;
pub mod runner;

pub use activation::{ActivationCell, RunnerState};
pub use checker::{check_fn, ChainContext, CheckFn, CheckResult, CheckerChain, CheckerOptions, Middleware, Next};
pub use executor::{DryRunExecutor, Executor, ForumExecutor};
pub use filter::{filter_fn, FilterFn};
pub use middleware::{DedupGate, PermissionGate, BLACKLIST_BAN_DAYS};
pub use perf::{PerfStat, PerfSummary};
pub use pipeline::{Pipeline, PipelineBuilder, DEFAULT_FAN_OUT_WINDOW};
pub use producer::{dedup_by_id, producer_fn, since_post_producer, ProducerFn};
pub use registry::{runner_fn, LevelRegistry, RunnerFn};
pub use runner::Tier;

#[cfg(any(test, feature = "testing"))]
pub use executor::RecordingExecutor;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Panics inside a node's review are caught per node, so poisoned locks are
// recovered rather than propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
