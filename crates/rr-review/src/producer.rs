//! # Producers
//!
//! A producer lists the children of one parent for review. Each level ships
//! a default backed by the [`ForumClient`]; any of them can be replaced.

use futures::future::{BoxFuture, FutureExt};
use rr_core::{Comment, Content, ForumClient, ForumPage, Post, Thread};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Comments the forum returns per comment page.
pub const COMMENTS_PER_PAGE: u32 = 30;

pub type ProduceResult<N> = anyhow::Result<Vec<N>>;

pub type ProducerFn<N> =
    Arc<dyn Fn(Arc<<N as Content>::Parent>) -> BoxFuture<'static, ProduceResult<N>> + Send + Sync>;

/// Boxes an async closure into a [`ProducerFn`].
pub fn producer_fn<N, F, Fut>(f: F) -> ProducerFn<N>
where
    N: Content,
    F: Fn(Arc<N::Parent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProduceResult<N>> + Send + 'static,
{
    Arc::new(move |parent| f(parent).boxed())
}

/// Keeps the first occurrence of every id, preserving order.
pub fn dedup_by_id<N: Content>(items: impl IntoIterator<Item = N>) -> Vec<N> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.id())).collect()
}

/// One forum listing page, without live broadcast threads.
pub fn default_thread_producer(client: Arc<dyn ForumClient>) -> ProducerFn<Thread> {
    producer_fn(move |page: Arc<ForumPage>| {
        let client = Arc::clone(&client);
        async move {
            let threads = client.fetch_threads(&page.forum, page.page).await?;
            ProduceResult::Ok(dedup_by_id(threads.into_iter().filter(|t| !t.is_livepost)))
        }
    })
}

/// The first page of replies and, for longer threads, the latest page.
pub fn default_post_producer(client: Arc<dyn ForumClient>) -> ProducerFn<Post> {
    producer_fn(move |thread: Arc<Thread>| {
        let client = Arc::clone(&client);
        async move {
            let first = client.fetch_posts(thread.tid, 1).await?;
            let mut posts = first.items;
            if first.total_pages > 1 {
                let last = client.fetch_posts(thread.tid, first.total_pages).await?;
                posts.extend(last.items);
            }
            ProduceResult::Ok(dedup_by_id(posts))
        }
    })
}

/// The comment preview embedded in the post, topped up with the latest
/// comment page when the preview is incomplete.
pub fn default_comment_producer(client: Arc<dyn ForumClient>) -> ProducerFn<Comment> {
    producer_fn(move |post: Arc<Post>| {
        let client = Arc::clone(&client);
        async move {
            let mut comments = post.comments.clone();
            if post.reply_num as usize > comments.len() {
                let page = post.reply_num / COMMENTS_PER_PAGE + 1;
                let latest = client.fetch_comments(post.tid, post.pid, page).await?;
                comments.extend(latest.items);
            }
            ProduceResult::Ok(dedup_by_id(comments))
        }
    })
}

/// Replies created at or after the unix timestamp `since`, newest first.
/// Walks the thread from its last page backwards and stops at the first
/// older reply.
pub fn since_post_producer(client: Arc<dyn ForumClient>, since: i64) -> ProducerFn<Post> {
    producer_fn(move |thread: Arc<Thread>| {
        let client = Arc::clone(&client);
        async move {
            let first = client.fetch_posts(thread.tid, 1).await?;
            let mut first_items = Some(first.items);
            let mut posts = Vec::new();
            'pages: for page in (1..=first.total_pages.max(1)).rev() {
                let items = match page {
                    1 => first_items.take().unwrap_or_default(),
                    _ => client.fetch_posts(thread.tid, page).await?.items,
                };
                for post in items.into_iter().rev() {
                    if post.create_time < since {
                        break 'pages;
                    }
                    posts.push(post);
                }
            }
            ProduceResult::Ok(dedup_by_id(posts))
        }
    })
}
