//! # Checker Chain
//!
//! A level's checker is a caller-supplied core function wrapped by an
//! ordered list of named middleware stages. The chain is composed once when
//! the core is registered and replaced as a whole on re-registration.

use crate::middleware::{DedupGate, PermissionGate};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use rr_core::{Content, DedupStore, PermissionStore, Punishment, Thresholds};
use std::future::Future;
use std::sync::Arc;

pub type CheckResult = anyhow::Result<Option<Punishment>>;

/// Caller-supplied per-node inspection.
pub type CheckFn<N> = Arc<dyn Fn(Arc<N>) -> BoxFuture<'static, CheckResult> + Send + Sync>;

/// Boxes an async closure into a [`CheckFn`].
pub fn check_fn<N, F, Fut>(f: F) -> CheckFn<N>
where
    N: Content,
    F: Fn(Arc<N>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckResult> + Send + 'static,
{
    Arc::new(move |node| f(node).boxed())
}

/// Which cross-cutting stages wrap the core checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerOptions {
    /// Black/white list short-circuit.
    pub user_check: bool,
    /// Skip nodes whose liveness tag is unchanged since they were last clean.
    pub dedup: bool,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            user_check: true,
            dedup: true,
        }
    }
}

/// A uniform `(node, next) -> punishment` stage.
#[async_trait]
pub trait Middleware<N: Content>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, node: Arc<N>, next: Next<'_, N>) -> CheckResult;
}

/// The remainder of the chain after the current stage.
pub struct Next<'a, N> {
    stages: &'a [Arc<dyn Middleware<N>>],
    core: &'a CheckFn<N>,
}

impl<'a, N: Content> Next<'a, N> {
    pub async fn run(self, node: Arc<N>) -> CheckResult {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(
                        node,
                        Next {
                            stages: rest,
                            core: self.core,
                        },
                    )
                    .await
            }
            None => (self.core)(node).await,
        }
    }
}

/// Stores the stages are built from.
#[derive(Clone)]
pub struct ChainContext {
    pub permissions: Arc<dyn PermissionStore>,
    pub dedup: Arc<dyn DedupStore>,
    pub thresholds: Thresholds,
}

pub struct CheckerChain<N: Content> {
    core: CheckFn<N>,
    options: CheckerOptions,
    stages: Vec<Arc<dyn Middleware<N>>>,
}

impl<N: Content> CheckerChain<N> {
    /// Wraps `core` with, outermost first: the permission gate, then the
    /// dedup gate, each only when enabled in `options`.
    pub fn compose(core: CheckFn<N>, options: CheckerOptions, ctx: &ChainContext) -> Self {
        let mut stages: Vec<Arc<dyn Middleware<N>>> = Vec::with_capacity(2);
        if options.user_check {
            stages.push(Arc::new(PermissionGate::new(
                Arc::clone(&ctx.permissions),
                ctx.thresholds,
            )));
        }
        if options.dedup {
            stages.push(Arc::new(DedupGate::new(Arc::clone(&ctx.dedup))));
        }
        Self {
            core,
            options,
            stages,
        }
    }

    /// The chain installed before any checker is registered: only the
    /// permission gate, so blacklisted authors are still caught on levels
    /// that are merely descended through.
    pub fn passthrough(ctx: &ChainContext) -> Self {
        Self::compose(
            check_fn(|_node: Arc<N>| async { CheckResult::Ok(None) }),
            CheckerOptions {
                user_check: true,
                dedup: false,
            },
            ctx,
        )
    }

    /// Same core, different stages.
    pub fn rewrap(&self, options: CheckerOptions, ctx: &ChainContext) -> Self {
        Self::compose(Arc::clone(&self.core), options, ctx)
    }

    pub fn options(&self) -> CheckerOptions {
        self.options
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn check(&self, node: Arc<N>) -> CheckResult {
        Next {
            stages: &self.stages,
            core: &self.core,
        }
        .run(node)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rr_core::{Ops, Post, User};
    use rr_store_memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(store: &Arc<MemoryStore>) -> ChainContext {
        ChainContext {
            permissions: store.clone(),
            dedup: store.clone(),
            thresholds: Thresholds::default(),
        }
    }

    fn post(pid: u64, user_id: u64) -> Arc<Post> {
        Arc::new(Post {
            pid,
            author: User {
                user_id,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware<Post> for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, node: Arc<Post>, next: Next<'_, Post>) -> CheckResult {
            let inner = next.run(node).await?;
            Ok(inner.map(|mut p| {
                p.note = format!("{}>{}", self.0, p.note);
                p
            }))
        }
    }

    #[tokio::test]
    async fn test_stage_order_is_permission_then_dedup() {
        let store = Arc::new(MemoryStore::default());
        let passthrough = CheckerChain::<Post>::passthrough(&ctx(&store));
        assert_eq!(passthrough.stage_names(), vec!["permission"]);

        let chain = passthrough.rewrap(CheckerOptions::default(), &ctx(&store));
        assert_eq!(chain.stage_names(), vec!["permission", "dedup"]);

        let bare = chain.rewrap(
            CheckerOptions {
                user_check: false,
                dedup: false,
            },
            &ctx(&store),
        );
        assert!(bare.stage_names().is_empty());
    }

    #[tokio::test]
    async fn test_next_runs_stages_outermost_first() {
        let core = check_fn(|node: Arc<Post>| async move {
            Ok::<_, anyhow::Error>(Some(Punishment::delete(node, "core")))
        });
        let chain = CheckerChain {
            core,
            options: CheckerOptions::default(),
            stages: vec![
                Arc::new(Tag("outer")) as Arc<dyn Middleware<Post>>,
                Arc::new(Tag("inner")),
            ],
        };
        let p = chain.check(post(1, 1)).await.unwrap().unwrap();
        assert_eq!(p.note, "outer>inner>core");
        assert_eq!(p.op, Ops::DELETE);
    }

    #[tokio::test]
    async fn test_core_errors_surface() {
        let store = Arc::new(MemoryStore::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let chain = CheckerChain::compose(
            check_fn(move |_node: Arc<Post>| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err::<Option<Punishment>, _>(anyhow::anyhow!("checker exploded"))
                }
            }),
            CheckerOptions::default(),
            &ctx(&store),
        );
        assert!(chain.check(post(1, 1)).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // a failed check is not recorded as clean
        assert_eq!(store.dedup_len(), 0);
    }
}
