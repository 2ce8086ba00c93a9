//! rusty-reviewer/crates/rr-review/src/middleware.rs
//!
//! Cross-cutting checker stages that sit in front of the caller's core check.

use crate::checker::{CheckResult, Middleware, Next};
use async_trait::async_trait;
use rr_core::{Content, DedupStore, Ops, PermissionRecord, PermissionStore, Punishment, Thresholds};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ban length applied to blacklisted authors.
pub const BLACKLIST_BAN_DAYS: u32 = 10;

/// Black/white list short-circuit.
///
/// Blacklisted authors are deleted and banned, whitelisted authors are
/// cleared; neither reaches the wrapped stages.
pub struct PermissionGate {
    store: Arc<dyn PermissionStore>,
    thresholds: Thresholds,
}

impl PermissionGate {
    pub fn new(store: Arc<dyn PermissionStore>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }
}

#[async_trait]
impl<N: Content> Middleware<N> for PermissionGate {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn handle(&self, node: Arc<N>, next: Next<'_, N>) -> CheckResult {
        let user_id = node.author().user_id;
        let record = match self.store.get(user_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user_id, error = %e, "permission lookup failed, treating user as neutral");
                PermissionRecord::neutral(user_id)
            }
        };

        if self.thresholds.is_blacklisted(record.level) {
            return Ok(Some(Punishment::new(
                node.into_node(),
                Ops::DELETE,
                BLACKLIST_BAN_DAYS,
                "blacklisted user",
            )));
        }
        if self.thresholds.is_whitelisted(record.level) {
            return Ok(Some(Punishment::none(node.into_node())));
        }

        next.run(node).await
    }
}

/// Skips nodes whose liveness tag has not changed since they were last
/// reviewed clean, and records the tag after a clean review.
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<N: Content> Middleware<N> for DedupGate {
    fn name(&self) -> &'static str {
        "dedup"
    }

    async fn handle(&self, node: Arc<N>, next: Next<'_, N>) -> CheckResult {
        let id = node.id();
        let live = node.liveness();

        match self.store.get(id).await {
            Ok(Some(tag)) if tag == live => {
                debug!(level = %N::LEVEL, id, tag, "unchanged since last review");
                return Ok(None);
            }
            Ok(Some(tag)) if live < tag => {
                // Rollback or inconsistent read: resync the tag and skip this once.
                debug!(level = %N::LEVEL, id, tag, live, "liveness went backwards");
                if let Err(e) = self.store.put(id, live).await {
                    warn!(level = %N::LEVEL, id, error = %e, "failed to refresh dedup record");
                }
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) => warn!(level = %N::LEVEL, id, error = %e, "dedup lookup failed"),
        }

        let verdict = next.run(node).await?;

        // Punished content stays unrecorded so it is re-examined next cycle.
        if !verdict.as_ref().is_some_and(Punishment::is_action) {
            if let Err(e) = self.store.put(id, live).await {
                warn!(level = %N::LEVEL, id, error = %e, "failed to write dedup record");
            }
        }
        Ok(verdict)
    }
}
