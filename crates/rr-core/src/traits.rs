//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the reviewer.

use crate::error::{ForumError, StoreError};
use crate::models::{Comment, Paged, Post, Thread, User};
use crate::records::PermissionRecord;
use async_trait::async_trait;

/// Read and moderation access to the forum being reviewed.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ForumClient: Send + Sync {
    // Listing
    async fn fetch_threads(&self, forum: &str, page: u32) -> Result<Vec<Thread>, ForumError>;
    async fn fetch_posts(&self, tid: u64, page: u32) -> Result<Paged<Post>, ForumError>;
    async fn fetch_comments(&self, tid: u64, pid: u64, page: u32) -> Result<Paged<Comment>, ForumError>;

    // Moderation
    async fn delete_content(&self, forum_id: u64, tid: u64, pid: u64) -> Result<(), ForumError>;
    async fn hide_thread(&self, forum_id: u64, tid: u64) -> Result<(), ForumError>;
    async fn ban_user(&self, forum_id: u64, user: &User, days: u32, reason: &str) -> Result<(), ForumError>;
}

/// Reviewer-maintained black/white list.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Returns a neutral (level 0) record for unknown users.
    async fn get(&self, user_id: u64) -> Result<PermissionRecord, StoreError>;
    async fn set(&self, record: PermissionRecord) -> Result<(), StoreError>;
    async fn remove(&self, user_id: u64) -> Result<(), StoreError>;
}

/// Liveness tags of nodes that were reviewed clean.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// `None` means "never recorded", which is distinct from a tag of 0.
    async fn get(&self, node_id: u64) -> Result<Option<i64>, StoreError>;
    async fn put(&self, node_id: u64, tag: i64) -> Result<(), StoreError>;
}
