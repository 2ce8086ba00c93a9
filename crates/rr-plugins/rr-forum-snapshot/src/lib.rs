//! # rr-forum-snapshot
//! rusty-reviewer/crates/rr-plugins/rr-forum-snapshot/src/lib.rs
//! A `ForumClient` served from a JSON dump of one forum.
//!
//! Listings behave like the live service: fixed-size pages, newest threads
//! first, a short comment preview on every post. Moderation calls are
//! recorded instead of sent anywhere, and deleted or hidden content
//! disappears from later listings.

use async_trait::async_trait;
use dashmap::DashSet;
use rr_core::error::ForumError;
use rr_core::models::{Comment, Paged, Post, Thread, User};
use rr_core::traits::ForumClient;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Items per listing page.
pub const PAGE_SIZE: usize = 30;
/// Comments embedded in each post of a post listing.
pub const COMMENT_PREVIEW: usize = 4;
/// Ban durations the service accepts.
pub const BAN_DAYS: [u32; 3] = [1, 3, 10];

/// On-disk layout of a forum dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub forum: String,
    #[serde(default)]
    pub forum_id: u64,
    #[serde(default)]
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// A moderation call the forum was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ForumAction {
    Delete { forum_id: u64, tid: u64, pid: u64 },
    Hide { forum_id: u64, tid: u64 },
    Ban { forum_id: u64, user_id: u64, days: u32, reason: String },
}

pub struct SnapshotForum {
    snapshot: Snapshot,
    deleted: DashSet<u64>,
    hidden: DashSet<u64>,
    actions: Mutex<Vec<ForumAction>>,
}

fn page_of<T>(items: Vec<T>, page: u32) -> Paged<T> {
    let total_pages = items.len().div_ceil(PAGE_SIZE).max(1) as u32;
    let skip = (page.max(1) as usize - 1) * PAGE_SIZE;
    Paged {
        items: items.into_iter().skip(skip).take(PAGE_SIZE).collect(),
        total_pages,
    }
}

/// The largest accepted duration below `days`, or the shortest one.
fn suggest_ban(days: u32) -> u32 {
    BAN_DAYS
        .iter()
        .rev()
        .copied()
        .find(|&allowed| allowed < days)
        .unwrap_or(BAN_DAYS[0])
}

impl SnapshotForum {
    pub fn from_snapshot(mut snapshot: Snapshot) -> Self {
        let forum_id = snapshot.forum_id;
        for thread in &mut snapshot.threads {
            if thread.forum_id == 0 {
                thread.forum_id = forum_id;
            }
        }
        for post in &mut snapshot.posts {
            if post.forum_id == 0 {
                post.forum_id = forum_id;
            }
        }
        for comment in &mut snapshot.comments {
            if comment.forum_id == 0 {
                comment.forum_id = forum_id;
            }
        }
        Self {
            snapshot,
            deleted: DashSet::new(),
            hidden: DashSet::new(),
            actions: Mutex::new(Vec::new()),
        }
    }

    /// Reads a JSON dump from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ForumError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| ForumError::Transport(format!("{}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| ForumError::Malformed(e.to_string()))?;
        debug!(
            forum = %snapshot.forum,
            threads = snapshot.threads.len(),
            posts = snapshot.posts.len(),
            comments = snapshot.comments.len(),
            "snapshot loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn forum(&self) -> &str {
        &self.snapshot.forum
    }

    pub async fn actions(&self) -> Vec<ForumAction> {
        self.actions.lock().await.clone()
    }

    pub fn is_deleted(&self, pid: u64) -> bool {
        self.deleted.contains(&pid)
    }

    pub fn is_hidden(&self, tid: u64) -> bool {
        self.hidden.contains(&tid)
    }

    fn thread_visible(&self, thread: &Thread) -> bool {
        !self.hidden.contains(&thread.tid) && !self.deleted.contains(&thread.pid)
    }

    fn visible_comments(&self, tid: u64, pid: u64) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .snapshot
            .comments
            .iter()
            .filter(|c| c.tid == tid && c.ppid == pid && !self.deleted.contains(&c.pid))
            .cloned()
            .collect();
        comments.sort_by_key(|c| (c.create_time, c.pid));
        comments
    }

    fn knows_pid(&self, pid: u64) -> bool {
        self.snapshot.threads.iter().any(|t| t.pid == pid)
            || self.snapshot.posts.iter().any(|p| p.pid == pid)
            || self.snapshot.comments.iter().any(|c| c.pid == pid)
    }

    async fn record(&self, action: ForumAction) {
        debug!(?action, "recorded");
        self.actions.lock().await.push(action);
    }
}

#[async_trait]
impl ForumClient for SnapshotForum {
    async fn fetch_threads(&self, forum: &str, page: u32) -> Result<Vec<Thread>, ForumError> {
        if forum != self.snapshot.forum {
            return Err(ForumError::NotFound(format!("forum {forum}")));
        }
        let mut threads: Vec<Thread> = self
            .snapshot
            .threads
            .iter()
            .filter(|t| self.thread_visible(t))
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.last_time.cmp(&a.last_time).then(a.tid.cmp(&b.tid)));
        Ok(page_of(threads, page).items)
    }

    async fn fetch_posts(&self, tid: u64, page: u32) -> Result<Paged<Post>, ForumError> {
        if !self.snapshot.threads.iter().any(|t| t.tid == tid) {
            return Err(ForumError::NotFound(format!("thread {tid}")));
        }
        let mut posts: Vec<Post> = self
            .snapshot
            .posts
            .iter()
            .filter(|p| p.tid == tid && !self.deleted.contains(&p.pid))
            .cloned()
            .collect();
        posts.sort_by_key(|p| (p.floor, p.pid));
        for post in &mut posts {
            let comments = self.visible_comments(tid, post.pid);
            post.reply_num = comments.len() as u32;
            post.comments = comments.into_iter().take(COMMENT_PREVIEW).collect();
        }
        Ok(page_of(posts, page))
    }

    async fn fetch_comments(&self, tid: u64, pid: u64, page: u32) -> Result<Paged<Comment>, ForumError> {
        if !self.snapshot.posts.iter().any(|p| p.tid == tid && p.pid == pid) {
            return Err(ForumError::NotFound(format!("post {pid}")));
        }
        Ok(page_of(self.visible_comments(tid, pid), page))
    }

    async fn delete_content(&self, forum_id: u64, tid: u64, pid: u64) -> Result<(), ForumError> {
        if !self.knows_pid(pid) {
            return Err(ForumError::NotFound(format!("pid {pid}")));
        }
        if !self.deleted.insert(pid) {
            return Err(ForumError::AlreadyActioned(format!("pid {pid}")));
        }
        self.record(ForumAction::Delete { forum_id, tid, pid }).await;
        Ok(())
    }

    async fn hide_thread(&self, forum_id: u64, tid: u64) -> Result<(), ForumError> {
        if !self.snapshot.threads.iter().any(|t| t.tid == tid) {
            return Err(ForumError::NotFound(format!("thread {tid}")));
        }
        if !self.hidden.insert(tid) {
            return Err(ForumError::AlreadyActioned(format!("thread {tid}")));
        }
        self.record(ForumAction::Hide { forum_id, tid }).await;
        Ok(())
    }

    async fn ban_user(&self, forum_id: u64, user: &User, days: u32, reason: &str) -> Result<(), ForumError> {
        if !BAN_DAYS.contains(&days) {
            return Err(ForumError::BanConflict {
                suggested_days: Some(suggest_ban(days)),
            });
        }
        self.record(ForumAction::Ban {
            forum_id,
            user_id: user.user_id,
            days,
            reason: reason.to_owned(),
        })
        .await;
        Ok(())
    }
}
