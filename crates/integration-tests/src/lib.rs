//! Shared fixtures for the end-to-end review tests.

use rr_core::{Comment, Content, Ops, Post, Punishment, Thread};
use rr_forum_snapshot::{Snapshot, SnapshotForum};
use rr_review::{check_fn, CheckFn, CheckResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const FORUM: &str = "rust";
pub const FORUM_ID: u64 = 7;

/// Two threads:
///
/// * tid 1 "Welcome": opening post 10, an ad (11) and a post (12) with
///   one spam comment (100) and one reply (101)
/// * tid 2 "Cheap casino": no replies
pub fn snapshot() -> Snapshot {
    serde_json::from_value(serde_json::json!({
        "forum": FORUM,
        "forum_id": FORUM_ID,
        "threads": [
            { "tid": 1, "pid": 10, "title": "Welcome", "author": { "user_id": 1 }, "last_time": 100 },
            { "tid": 2, "pid": 20, "title": "Cheap casino", "author": { "user_id": 2 }, "last_time": 90 }
        ],
        "posts": [
            { "tid": 1, "pid": 10, "floor": 1, "text": "hello", "author": { "user_id": 1 } },
            { "tid": 1, "pid": 11, "floor": 2, "text": "buy followers now", "author": { "user_id": 3 } },
            { "tid": 1, "pid": 12, "floor": 3, "text": "nice", "author": { "user_id": 4 } },
            { "tid": 2, "pid": 20, "floor": 1, "text": "", "author": { "user_id": 2 } }
        ],
        "comments": [
            { "tid": 1, "ppid": 12, "pid": 100, "text": "spam link", "author": { "user_id": 5 }, "create_time": 1 },
            { "tid": 1, "ppid": 12, "pid": 101, "text": "agreed", "author": { "user_id": 6 }, "create_time": 2 }
        ]
    }))
    .expect("fixture snapshot")
}

pub fn forum() -> Arc<SnapshotForum> {
    Arc::new(SnapshotForum::from_snapshot(snapshot()))
}

/// Counts calls and punishes nodes whose text contains `needle`.
pub struct KeywordCheck {
    calls: Arc<AtomicUsize>,
}

impl KeywordCheck {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn checker<N, F>(&self, needle: &'static str, text: F, op: Ops, ban_days: u32) -> CheckFn<N>
    where
        N: Content,
        F: Fn(&N) -> String + Send + Sync + 'static,
    {
        let calls = Arc::clone(&self.calls);
        check_fn(move |node: Arc<N>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let verdict = text(&node)
                .contains(needle)
                .then(|| Punishment::new(node.into_node(), op, ban_days, needle));
            async move { CheckResult::Ok(verdict) }
        })
    }
}

impl Default for KeywordCheck {
    fn default() -> Self {
        Self::new()
    }
}

pub fn thread_title(thread: &Thread) -> String {
    thread.title.clone()
}

pub fn post_text(post: &Post) -> String {
    post.text.clone()
}

pub fn comment_text(comment: &Comment) -> String {
    comment.text.clone()
}
