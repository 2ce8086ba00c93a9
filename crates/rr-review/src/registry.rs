//! # Level Registry
//!
//! Everything the pipeline knows about one level: its producer, filters,
//! checker chain and optional runner override, plus the activation cell
//! that links it to the level above.
//!
//! All slots are swapped atomically behind `RwLock`s; a review already in
//! flight keeps the snapshot it started with.

use crate::activation::{ActivationCell, RunnerState};
use crate::checker::{ChainContext, CheckFn, CheckResult, CheckerChain, CheckerOptions};
use crate::filter::FilterFn;
use crate::perf::{PerfStat, PerfSummary};
use crate::producer::ProducerFn;
use crate::{read, write};
use futures::future::{BoxFuture, FutureExt};
use rr_core::{Content, Level};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

/// Caller logic replacing the default per-node orchestration.
pub type RunnerFn<N> = Arc<dyn Fn(Arc<N>) -> BoxFuture<'static, CheckResult> + Send + Sync>;

/// Boxes an async closure into a [`RunnerFn`].
pub fn runner_fn<N, F, Fut>(f: F) -> RunnerFn<N>
where
    N: Content,
    F: Fn(Arc<N>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckResult> + Send + 'static,
{
    Arc::new(move |node| f(node).boxed())
}

pub struct LevelRegistry<N: Content> {
    ctx: ChainContext,
    cell: Arc<ActivationCell>,
    producer: RwLock<ProducerFn<N>>,
    filters: RwLock<Vec<FilterFn<N>>>,
    checker: RwLock<Arc<CheckerChain<N>>>,
    runner: RwLock<Option<RunnerFn<N>>>,
    perf_log: AtomicBool,
    perf: PerfStat,
}

impl<N: Content> LevelRegistry<N> {
    pub(crate) fn new(producer: ProducerFn<N>, ctx: ChainContext, cell: Arc<ActivationCell>) -> Self {
        let checker = Arc::new(CheckerChain::passthrough(&ctx));
        Self {
            ctx,
            cell,
            producer: RwLock::new(producer),
            filters: RwLock::new(Vec::new()),
            checker: RwLock::new(checker),
            runner: RwLock::new(None),
            perf_log: AtomicBool::new(false),
            perf: PerfStat::default(),
        }
    }

    pub fn level(&self) -> Level {
        N::LEVEL
    }

    pub fn state(&self) -> RunnerState {
        self.cell.state()
    }

    /// Replaces the producer. Does not activate the level on its own.
    pub fn set_producer(&self, producer: ProducerFn<N>) {
        *write(&self.producer) = producer;
        debug!(level = %N::LEVEL, "producer replaced");
    }

    /// Appends a batch filter and activates this level and its ancestors.
    pub fn append_filter(&self, filter: FilterFn<N>) {
        let count = {
            let mut filters = write(&self.filters);
            filters.push(filter);
            filters.len()
        };
        debug!(level = %N::LEVEL, count, "filter appended");
        self.cell.activate();
    }

    /// Installs `core` wrapped according to `options`, replacing the whole
    /// previous chain, and activates this level and its ancestors.
    pub fn set_checker(&self, options: CheckerOptions, core: CheckFn<N>) {
        let chain = CheckerChain::compose(core, options, &self.ctx);
        debug!(level = %N::LEVEL, stages = ?chain.stage_names(), "checker installed");
        *write(&self.checker) = Arc::new(chain);
        self.cell.activate();
    }

    /// Replaces the default per-node orchestration with `runner`.
    pub fn set_runner(&self, perf_log: bool, runner: RunnerFn<N>) {
        *write(&self.runner) = Some(runner);
        self.set_perf_log(perf_log);
        self.cell.override_runner();
    }

    pub fn set_perf_log(&self, enabled: bool) {
        self.perf_log.store(enabled, Ordering::Relaxed);
    }

    pub fn perf_log(&self) -> bool {
        self.perf_log.load(Ordering::Relaxed)
    }

    pub fn perf(&self) -> PerfSummary {
        self.perf.summary()
    }

    pub fn filter_count(&self) -> usize {
        read(&self.filters).len()
    }

    pub fn checker_options(&self) -> CheckerOptions {
        read(&self.checker).options()
    }

    /// Re-wraps the current core with different stages. Leaves activation alone.
    pub(crate) fn rewrap_checker(&self, options: CheckerOptions) {
        let mut checker = write(&self.checker);
        *checker = Arc::new(checker.rewrap(options, &self.ctx));
    }

    /// A chain with the current core and different stages, not installed.
    pub(crate) fn rewrapped_checker(&self, options: CheckerOptions) -> CheckerChain<N> {
        read(&self.checker).rewrap(options, &self.ctx)
    }

    pub(crate) fn producer(&self) -> ProducerFn<N> {
        Arc::clone(&read(&self.producer))
    }

    pub(crate) fn filters(&self) -> Vec<FilterFn<N>> {
        read(&self.filters).clone()
    }

    pub(crate) fn checker(&self) -> Arc<CheckerChain<N>> {
        Arc::clone(&read(&self.checker))
    }

    pub(crate) fn runner(&self) -> Option<RunnerFn<N>> {
        read(&self.runner).clone()
    }

    pub(crate) fn record(&self, elapsed: Duration) {
        self.perf.record(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::check_fn;
    use crate::filter::filter_fn;
    use crate::producer::producer_fn;
    use rr_core::{Post, Thread};
    use rr_store_memory::MemoryStore;

    fn registry() -> (LevelRegistry<Post>, Arc<ActivationCell>) {
        let store = Arc::new(MemoryStore::default());
        let ctx = ChainContext {
            permissions: store.clone(),
            dedup: store,
            thresholds: Default::default(),
        };
        let root = ActivationCell::root(Level::Thread);
        let cell = ActivationCell::child(Level::Post, &root);
        let producer = producer_fn(|_thread: Arc<Thread>| async { anyhow::Ok(Vec::<Post>::new()) });
        (LevelRegistry::new(producer, ctx, cell), root)
    }

    #[test]
    fn test_producer_alone_keeps_level_inert() {
        let (posts, root) = registry();
        posts.set_producer(producer_fn(|_thread: Arc<Thread>| async { anyhow::Ok(Vec::<Post>::new()) }));
        assert_eq!(posts.state(), RunnerState::Inert);
        assert_eq!(root.state(), RunnerState::Inert);
    }

    #[test]
    fn test_filter_activates_level_and_parent() {
        let (posts, root) = registry();
        posts.append_filter(filter_fn(|_batch: Vec<Arc<Post>>| async { anyhow::Ok(None) }));
        assert_eq!(posts.filter_count(), 1);
        assert_eq!(posts.state(), RunnerState::Active);
        assert_eq!(root.state(), RunnerState::Active);
    }

    #[test]
    fn test_checker_replaces_whole_chain() {
        let (posts, _root) = registry();
        assert_eq!(posts.checker().stage_names(), vec!["permission"]);

        posts.set_checker(
            CheckerOptions::default(),
            check_fn(|_post: Arc<Post>| async { CheckResult::Ok(None) }),
        );
        assert_eq!(posts.checker().stage_names(), vec!["permission", "dedup"]);

        posts.rewrap_checker(CheckerOptions {
            user_check: true,
            dedup: false,
        });
        assert!(!posts.checker_options().dedup);
    }

    #[test]
    fn test_runner_override_sets_perf_flag() {
        let (posts, root) = registry();
        posts.set_runner(true, runner_fn(|_post: Arc<Post>| async { CheckResult::Ok(None) }));
        assert_eq!(posts.state(), RunnerState::Overridden);
        assert_eq!(root.state(), RunnerState::Active);
        assert!(posts.perf_log());
        assert!(posts.runner().is_some());
    }
}
