//! # Pipeline
//!
//! The single configuration struct owning the three level registries, the
//! active executor and the entry points. Levels are wired once at build
//! time: comments activate posts, posts activate threads.
//!
//! # Developer Note
//! A freshly built pipeline executes nothing against the forum. The
//! [`DryRunExecutor`] stays installed until [`Pipeline::enable_production`]
//! is called or a block is wrapped in [`Pipeline::with_executor`].

use crate::activation::{ActivationCell, RunnerState};
use crate::checker::{ChainContext, CheckerOptions};
use crate::executor::{DryRunExecutor, Executor, ForumExecutor};
use crate::perf::{PerfStat, PerfSummary};
use crate::producer::{default_comment_producer, default_post_producer, default_thread_producer, since_post_producer};
use crate::registry::LevelRegistry;
use crate::runner::{classify, run_batch, Tier};
use crate::{read, write};
use rr_core::{
    Comment, DedupStore, ForumClient, ForumPage, Level, PermissionStore, Post, Punishment, Result, ReviewError, Thread,
    Thresholds,
};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Siblings reviewed concurrently at most.
pub const DEFAULT_FAN_OUT_WINDOW: usize = 50;

/// Stages used by the multi-page sweep and by [`Pipeline::inspect`].
const NO_DEDUP: CheckerOptions = CheckerOptions {
    user_check: true,
    dedup: false,
};

pub struct PipelineBuilder {
    client: Option<Arc<dyn ForumClient>>,
    permissions: Option<Arc<dyn PermissionStore>>,
    dedup: Option<Arc<dyn DedupStore>>,
    thresholds: Thresholds,
    fan_out_window: usize,
    executor: Option<Arc<dyn Executor>>,
}

impl PipelineBuilder {
    pub fn client(mut self, client: Arc<dyn ForumClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn permissions(mut self, store: Arc<dyn PermissionStore>) -> Self {
        self.permissions = Some(store);
        self
    }

    pub fn dedup(mut self, store: Arc<dyn DedupStore>) -> Self {
        self.dedup = Some(store);
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn fan_out_window(mut self, window: usize) -> Self {
        self.fan_out_window = window;
        self
    }

    /// Overrides the initial executor (dry run by default).
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let client = self
            .client
            .ok_or_else(|| ReviewError::Configuration("no forum client".into()))?;
        let permissions = self
            .permissions
            .ok_or_else(|| ReviewError::Configuration("no permission store".into()))?;
        let dedup = self
            .dedup
            .ok_or_else(|| ReviewError::Configuration("no dedup store".into()))?;

        if self.thresholds.blacklist >= self.thresholds.whitelist {
            return Err(ReviewError::Configuration(format!(
                "blacklist threshold {} must be below whitelist threshold {}",
                self.thresholds.blacklist, self.thresholds.whitelist
            )));
        }
        if self.fan_out_window == 0 {
            return Err(ReviewError::Configuration("fan-out window must be positive".into()));
        }

        let ctx = ChainContext {
            permissions,
            dedup,
            thresholds: self.thresholds,
        };

        // Upward hooks: comment -> post -> thread.
        let thread_cell = ActivationCell::root(Level::Thread);
        let post_cell = ActivationCell::child(Level::Post, &thread_cell);
        let comment_cell = ActivationCell::child(Level::Comment, &post_cell);

        let threads = LevelRegistry::new(default_thread_producer(Arc::clone(&client)), ctx.clone(), thread_cell);
        threads.set_perf_log(true);
        let posts = LevelRegistry::new(default_post_producer(Arc::clone(&client)), ctx.clone(), post_cell);
        let comments = LevelRegistry::new(default_comment_producer(Arc::clone(&client)), ctx, comment_cell);

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(DryRunExecutor) as Arc<dyn Executor>);
        debug!(executor = executor.name(), window = self.fan_out_window, "pipeline built");

        Ok(Pipeline {
            client,
            threads,
            posts,
            comments,
            executor: RwLock::new(ExecutorSlot {
                base: executor,
                scopes: Vec::new(),
                next_scope: 0,
            }),
            fan_out_window: self.fan_out_window,
            pages: PerfStat::default(),
        })
    }
}

pub struct Pipeline {
    client: Arc<dyn ForumClient>,
    threads: LevelRegistry<Thread>,
    posts: LevelRegistry<Post>,
    comments: LevelRegistry<Comment>,
    executor: RwLock<ExecutorSlot>,
    fan_out_window: usize,
    pages: PerfStat,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder {
            client: None,
            permissions: None,
            dedup: None,
            thresholds: Thresholds::default(),
            fan_out_window: DEFAULT_FAN_OUT_WINDOW,
            executor: None,
        }
    }

    pub fn threads(&self) -> &LevelRegistry<Thread> {
        &self.threads
    }

    pub fn posts(&self) -> &LevelRegistry<Post> {
        &self.posts
    }

    pub fn comments(&self) -> &LevelRegistry<Comment> {
        &self.comments
    }

    pub fn fan_out_window(&self) -> usize {
        self.fan_out_window
    }

    pub fn state(&self, level: Level) -> RunnerState {
        match level {
            Level::Thread => self.threads.state(),
            Level::Post => self.posts.state(),
            Level::Comment => self.comments.state(),
        }
    }

    /// Rolling runner durations of one level.
    pub fn perf(&self, level: Level) -> PerfSummary {
        match level {
            Level::Thread => self.threads.perf(),
            Level::Post => self.posts.perf(),
            Level::Comment => self.comments.perf(),
        }
    }

    /// Rolling durations of whole listing pages.
    pub fn page_perf(&self) -> PerfSummary {
        self.pages.summary()
    }

    // ── Executor ────────────────────────────────────────────────────────────

    pub fn executor_name(&self) -> &'static str {
        read(&self.executor).current().name()
    }

    /// Installs `executor` as the base executor, returning the previous
    /// base. Scopes opened by [`Pipeline::with_executor`] keep precedence
    /// until they close.
    pub fn set_executor(&self, executor: Arc<dyn Executor>) -> Arc<dyn Executor> {
        std::mem::replace(&mut write(&self.executor).base, executor)
    }

    /// Switches from the dry run to real moderation calls.
    pub fn enable_production(&self) {
        self.set_executor(Arc::new(ForumExecutor::new(Arc::clone(&self.client))));
        info!("production executor enabled");
    }

    /// Runs `fut` with `executor` installed. However `fut` ends, only this
    /// scope is removed: overlapping scopes may close in any order and the
    /// newest one still open stays in charge.
    pub async fn with_executor<F: Future>(&self, executor: Arc<dyn Executor>, fut: F) -> F::Output {
        let scope = {
            let mut slot = write(&self.executor);
            let scope = slot.next_scope;
            slot.next_scope += 1;
            slot.scopes.push((scope, executor));
            scope
        };
        let _guard = ExecutorGuard {
            slot: &self.executor,
            scope,
        };
        fut.await
    }

    pub async fn with_test_executor<F: Future>(&self, fut: F) -> F::Output {
        self.with_executor(Arc::new(DryRunExecutor), fut).await
    }

    /// Hands `punishment` to the current executor.
    pub async fn execute(&self, punishment: Punishment) -> Option<Punishment> {
        let executor = Arc::clone(read(&self.executor).current());
        executor.execute(punishment).await
    }

    /// Executes `punishment`, walking each residual up to its target's
    /// parent until nothing is left. Returns a residual that ran out of
    /// ancestors.
    pub async fn resubmit(&self, punishment: Punishment) -> Option<Punishment> {
        let mut pending = punishment;
        loop {
            let mut residual = self.execute(pending).await?;
            if !residual.retarget_to_parent() {
                warn!(node = %residual.target, op = %residual.op, "residual has no parent to move to");
                return Some(residual);
            }
            pending = residual;
        }
    }

    // ── Entry points ────────────────────────────────────────────────────────

    /// Reviews one listing page. Returns immediately when nothing has been
    /// registered anywhere; fails only when the page itself cannot be listed.
    pub async fn run_once(&self, forum: &str, page: u32) -> Result<()> {
        if self.threads.state() == RunnerState::Inert {
            debug!(forum, page, "no level registered, nothing to review");
            return Ok(());
        }

        let started = Instant::now();
        let listing = Arc::new(ForumPage {
            forum: forum.to_owned(),
            page,
        });
        if let Some(escaped) = run_batch::<Thread>(self, listing).await? {
            warn!(node = %escaped.target, op = %escaped.op, note = %escaped.note, "punishment escaped the root level, dropped");
        }

        let elapsed = started.elapsed();
        self.pages.record(elapsed);
        if self.threads.perf_log() {
            info!(forum, page, elapsed_ms = elapsed.as_millis() as u64, "page reviewed");
        }
        Ok(())
    }

    /// Reviews the first page forever, sleeping `interval` between cycles.
    pub async fn run_loop(&self, forum: &str, interval: Duration) {
        self.run_loop_with(forum, std::iter::repeat(interval)).await
    }

    /// Reviews the first page once per item of `intervals`, sleeping that
    /// long after each cycle. Returns when the intervals run out.
    pub async fn run_loop_with<I>(&self, forum: &str, intervals: I)
    where
        I: IntoIterator<Item = Duration>,
    {
        for interval in intervals {
            if let Err(e) = self.run_once(forum, 1).await {
                warn!(forum, error = %e, "review cycle failed");
            }
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
    }

    /// Sweeps `pages` in the given order with dedup disabled on every level,
    /// so content reviewed clean before is checked again.
    pub async fn run_pages(&self, forum: &str, pages: &[u32]) -> Result<()> {
        self.threads.rewrap_checker(NO_DEDUP);
        self.posts.rewrap_checker(NO_DEDUP);
        self.comments.rewrap_checker(NO_DEDUP);

        for &page in pages {
            if let Err(e) = self.run_once(forum, page).await {
                warn!(forum, page, error = %e, "page sweep failed, continuing");
            }
        }
        Ok(())
    }

    /// Like [`Pipeline::run_pages`], restricted to replies created at or
    /// after the unix timestamp `since`. The post producer is replaced for
    /// good with one that walks each thread from its last page backwards.
    pub async fn run_pages_since(&self, forum: &str, pages: &[u32], since: i64) -> Result<()> {
        self.posts.set_producer(since_post_producer(Arc::clone(&self.client), since));
        self.run_pages(forum, pages).await
    }

    /// Runs one node through its level's checker without dedup and
    /// without executing the result.
    pub async fn inspect<N: Tier>(&self, node: Arc<N>) -> Result<Option<Punishment>> {
        let chain = N::registry(self).rewrapped_checker(NO_DEDUP);
        chain.check(node).await.map_err(classify)
    }
}

/// The base executor plus the scoped overrides still open, oldest first.
struct ExecutorSlot {
    base: Arc<dyn Executor>,
    scopes: Vec<(u64, Arc<dyn Executor>)>,
    next_scope: u64,
}

impl ExecutorSlot {
    fn current(&self) -> &Arc<dyn Executor> {
        self.scopes.last().map_or(&self.base, |(_, executor)| executor)
    }
}

/// Closes one executor scope when dropped.
struct ExecutorGuard<'a> {
    slot: &'a RwLock<ExecutorSlot>,
    scope: u64,
}

impl Drop for ExecutorGuard<'_> {
    fn drop(&mut self) {
        write(self.slot).scopes.retain(|(scope, _)| *scope != self.scope);
    }
}
