//! # Filters
//!
//! Batch-level inspection over all siblings produced for one parent, for
//! violations a per-node checker cannot see (floods, near-duplicates).

use futures::future::{BoxFuture, FutureExt};
use rr_core::{Content, Punishment};
use std::future::Future;
use std::sync::Arc;

pub type FilterResult = anyhow::Result<Option<Vec<Punishment>>>;

pub type FilterFn<N> = Arc<dyn Fn(Vec<Arc<N>>) -> BoxFuture<'static, FilterResult> + Send + Sync>;

/// Boxes an async closure into a [`FilterFn`].
pub fn filter_fn<N, F, Fut>(f: F) -> FilterFn<N>
where
    N: Content,
    F: Fn(Vec<Arc<N>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FilterResult> + Send + 'static,
{
    Arc::new(move |batch| f(batch).boxed())
}

/// Drops every node that is the target of an actionable punishment.
pub(crate) fn remove_punished<N: Content>(batch: &mut Vec<Arc<N>>, punishments: &[Punishment]) {
    batch.retain(|node| {
        !punishments
            .iter()
            .any(|p| p.is_action() && p.target.level() == N::LEVEL && p.target.id() == node.id())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rr_core::Post;

    fn batch(ids: &[u64]) -> Vec<Arc<Post>> {
        ids.iter()
            .map(|&pid| {
                Arc::new(Post {
                    pid,
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_only_actionable_targets_are_removed() {
        let mut posts = batch(&[1, 2, 3]);
        let punishments = vec![
            Punishment::delete(posts[0].clone(), "flood"),
            Punishment::none(posts[1].clone()),
        ];
        remove_punished(&mut posts, &punishments);
        let ids: Vec<u64> = posts.iter().map(|p| p.pid).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_filter_fn_sees_whole_batch() {
        let filter = filter_fn(|posts: Vec<Arc<Post>>| async move {
            FilterResult::Ok(Some(
                posts
                    .into_iter()
                    .filter(|p| p.pid % 2 == 0)
                    .map(|p| Punishment::delete(p, "even"))
                    .collect::<Vec<_>>(),
            ))
        });
        let punished = filter(batch(&[1, 2, 3, 4])).await.unwrap().unwrap();
        assert_eq!(punished.len(), 2);
    }
}
