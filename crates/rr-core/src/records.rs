//! # Store Records
//!
//! Records that outlive a review cycle. Both are persisted by external
//! stores; the pipeline only reads them (and writes dedup tags).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// "This node was reviewed clean while its liveness tag was `tag`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub node_id: u64,
    pub tag: i64,
    pub recorded_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn new(node_id: u64, tag: i64) -> Self {
        Self {
            node_id,
            tag,
            recorded_at: Utc::now(),
        }
    }
}

/// Reviewer-assigned standing of a user. Level 0 is neutral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub user_id: u64,
    pub level: i32,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

impl PermissionRecord {
    pub fn new(user_id: u64, level: i32, note: impl Into<String>) -> Self {
        Self {
            user_id,
            level,
            note: note.into(),
            recorded_at: Utc::now(),
        }
    }

    /// What a store returns for users it knows nothing about.
    pub fn neutral(user_id: u64) -> Self {
        Self::new(user_id, 0, "")
    }
}

/// Permission levels at which the user checker short-circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// `level <= blacklist` deletes and bans without running the checker
    pub blacklist: i32,
    /// `level >= whitelist` clears the node without running the checker
    pub whitelist: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            blacklist: -5,
            whitelist: 1,
        }
    }
}

impl Thresholds {
    pub fn is_blacklisted(&self, level: i32) -> bool {
        level <= self.blacklist
    }

    pub fn is_whitelisted(&self, level: i32) -> bool {
        level >= self.whitelist
    }
}
