//! # Runners
//!
//! Default orchestration for one batch of siblings and for one node.
//!
//! A batch runs: producer → filters (sequential) → per-node runners
//! (concurrent, in windows) → `|`-aggregate. A node runs: checker → forward
//! to executor, then the child batch → retarget to this node → forward to
//! executor. Whatever the executor hands back travels one level up.

use crate::activation::RunnerState;
use crate::filter::remove_punished;
use crate::pipeline::Pipeline;
use crate::registry::LevelRegistry;
use futures::future::{self, BoxFuture, FutureExt};
use rr_core::{Comment, Content, ForumError, Post, Punishment, ReviewError, Thread};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A level of the content tree together with the way down to its children.
pub trait Tier: Content {
    fn registry(pipeline: &Pipeline) -> &LevelRegistry<Self>;

    /// Reviews this node's children and returns their aggregate, if any.
    fn review_children<'a>(pipeline: &'a Pipeline, node: &'a Arc<Self>) -> BoxFuture<'a, Option<Punishment>>;
}

impl Tier for Thread {
    fn registry(pipeline: &Pipeline) -> &LevelRegistry<Self> {
        pipeline.threads()
    }

    fn review_children<'a>(pipeline: &'a Pipeline, node: &'a Arc<Self>) -> BoxFuture<'a, Option<Punishment>> {
        review_batch::<Post>(pipeline, Arc::clone(node)).boxed()
    }
}

impl Tier for Post {
    fn registry(pipeline: &Pipeline) -> &LevelRegistry<Self> {
        pipeline.posts()
    }

    fn review_children<'a>(pipeline: &'a Pipeline, node: &'a Arc<Self>) -> BoxFuture<'a, Option<Punishment>> {
        review_batch::<Comment>(pipeline, Arc::clone(node)).boxed()
    }
}

impl Tier for Comment {
    fn registry(pipeline: &Pipeline) -> &LevelRegistry<Self> {
        pipeline.comments()
    }

    fn review_children<'a>(_pipeline: &'a Pipeline, _node: &'a Arc<Self>) -> BoxFuture<'a, Option<Punishment>> {
        future::ready(None).boxed()
    }
}

/// Maps a caller-supplied failure onto the pipeline taxonomy.
pub(crate) fn classify(error: anyhow::Error) -> ReviewError {
    match error.downcast::<ForumError>() {
        Ok(forum) => ReviewError::Transport(forum),
        Err(other) => match other.downcast::<ReviewError>() {
            Ok(review) => review,
            Err(other) => ReviewError::Check(other),
        },
    }
}

fn fold(aggregate: &mut Option<Punishment>, punishment: Punishment) {
    if !punishment.is_action() {
        return;
    }
    *aggregate = Some(match aggregate.take() {
        Some(current) => current | punishment,
        None => punishment,
    });
}

/// Below the root a failing producer means "no children".
async fn review_batch<N: Tier>(pipeline: &Pipeline, parent: Arc<N::Parent>) -> Option<Punishment> {
    match run_batch::<N>(pipeline, parent).await {
        Ok(aggregate) => aggregate,
        Err(e) => {
            warn!(level = %N::LEVEL, error = %e, "producer failed, treating as no children");
            None
        }
    }
}

/// Reviews every child of `parent` at level `N`. Only producer failures
/// surface as errors; everything past the producer is isolated per node.
pub(crate) async fn run_batch<N: Tier>(
    pipeline: &Pipeline,
    parent: Arc<N::Parent>,
) -> Result<Option<Punishment>, ReviewError> {
    let registry = N::registry(pipeline);
    if registry.state() == RunnerState::Inert {
        return Ok(None);
    }

    // 1. Produce
    let produced = (registry.producer())(Arc::clone(&parent)).await.map_err(classify)?;
    let mut batch = Vec::with_capacity(produced.len());
    for mut node in produced {
        if let Err(e) = node.validate() {
            warn!(level = %N::LEVEL, error = %e, "skipping malformed node");
            continue;
        }
        node.attach(&parent);
        batch.push(Arc::new(node));
    }

    // 2. Filter
    let mut aggregate = None;
    for filter in registry.filters() {
        let punishments = match filter(batch.clone()).await {
            Ok(Some(punishments)) => punishments,
            Ok(None) => continue,
            Err(e) => {
                warn!(level = %N::LEVEL, error = %e, "filter failed");
                continue;
            }
        };
        remove_punished(&mut batch, &punishments);
        let residuals = future::join_all(
            punishments
                .into_iter()
                .filter(Punishment::is_action)
                .map(|p| pipeline.execute(p)),
        )
        .await;
        for residual in residuals.into_iter().flatten() {
            fold(&mut aggregate, residual);
        }
    }

    // 3. Fan out
    for window in batch.chunks(pipeline.fan_out_window()) {
        let results = future::join_all(
            window
                .iter()
                .map(|node| AssertUnwindSafe(run_node(pipeline, Arc::clone(node))).catch_unwind()),
        )
        .await;
        for (node, result) in window.iter().zip(results) {
            match result {
                Ok(Ok(Some(residual))) => fold(&mut aggregate, residual),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!(level = %N::LEVEL, id = node.id(), error = %e, "review failed, node skipped"),
                Err(_) => warn!(level = %N::LEVEL, id = node.id(), "review panicked, node skipped"),
            }
        }
    }

    Ok(aggregate)
}

/// Reviews one node and everything below it.
pub(crate) async fn run_node<N: Tier>(pipeline: &Pipeline, node: Arc<N>) -> Result<Option<Punishment>, ReviewError> {
    let registry = N::registry(pipeline);
    let started = Instant::now();

    let result = match (registry.state(), registry.runner()) {
        (RunnerState::Inert, _) => return Ok(None),
        (RunnerState::Overridden, Some(runner)) => runner(Arc::clone(&node)).await.map_err(classify),
        _ => default_node(pipeline, registry, &node).await,
    };

    let elapsed = started.elapsed();
    registry.record(elapsed);
    if registry.perf_log() {
        debug!(level = %N::LEVEL, id = node.id(), elapsed_ms = elapsed.as_millis() as u64, "checked");
    }
    result
}

async fn default_node<N: Tier>(
    pipeline: &Pipeline,
    registry: &LevelRegistry<N>,
    node: &Arc<N>,
) -> Result<Option<Punishment>, ReviewError> {
    let mut residual = None;

    // 1. The node itself
    if let Some(punishment) = registry.checker().check(Arc::clone(node)).await.map_err(classify)? {
        if punishment.is_action() {
            if let Some(r) = pipeline.execute(punishment).await {
                fold(&mut residual, r);
            }
        }
    }

    // 2. Its children, charged to the node
    if let Some(mut aggregate) = N::review_children(pipeline, node).await {
        aggregate.retarget(Arc::clone(node).into_node());
        if let Some(r) = pipeline.execute(aggregate).await {
            fold(&mut residual, r);
        }
    }

    Ok(residual)
}
