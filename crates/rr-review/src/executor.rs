//! # Executors
//!
//! An executor consumes one resolved punishment and applies its side
//! effects. Propagation bits are handled first: a punishment carrying
//! `PARENT` or `GRANDPARENT` is never acted upon at its current target but
//! handed back as a residual for the caller to re-target upward.
//!
//! # Developer Note
//! Executors never fail. A target that vanished or was already actioned
//! counts as done; any other transport failure is logged and swallowed so
//! that one stubborn node cannot stall its siblings.

use async_trait::async_trait;
use rr_core::{ForumClient, ForumError, Ops, Punishment};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Applies `punishment`; returns the residual when it must be re-targeted.
    async fn execute(&self, punishment: Punishment) -> Option<Punishment>;
}

/// Applies punishments against the live forum.
pub struct ForumExecutor {
    client: Arc<dyn ForumClient>,
}

impl ForumExecutor {
    pub fn new(client: Arc<dyn ForumClient>) -> Self {
        Self { client }
    }

    async fn ban(&self, punishment: &Punishment, reason: &str) {
        let target = &punishment.target;
        let user = target.author();
        let result = match self
            .client
            .ban_user(target.forum_id(), user, punishment.ban_days, reason)
            .await
        {
            Err(ForumError::BanConflict { suggested_days }) => {
                let days = suggested_days.unwrap_or(1);
                warn!(
                    user = user.log_name(),
                    requested = punishment.ban_days,
                    retry = days,
                    "ban conflict, retrying once"
                );
                self.client.ban_user(target.forum_id(), user, days, reason).await
            }
            other => other,
        };
        report("ban", punishment, result);
    }
}

#[async_trait]
impl Executor for ForumExecutor {
    fn name(&self) -> &'static str {
        "forum"
    }

    async fn execute(&self, mut punishment: Punishment) -> Option<Punishment> {
        if punishment.take_propagation() {
            return Some(punishment);
        }
        if !punishment.is_action() {
            return None;
        }

        let reason = punishment.reason();
        let target = punishment.target.clone();

        // 1. Ban
        if punishment.ban_days > 0 {
            self.ban(&punishment, &reason).await;
        }

        // 2. Delete
        if punishment.op.contains(Ops::DELETE) {
            let result = self
                .client
                .delete_content(target.forum_id(), target.tid(), target.pid())
                .await;
            report("delete", &punishment, result);
        }

        // 3. Hide the owning thread
        if punishment.op.contains(Ops::HIDE) {
            let result = self.client.hide_thread(target.forum_id(), target.tid()).await;
            report("hide", &punishment, result);
        }

        None
    }
}

fn report(action: &'static str, punishment: &Punishment, result: Result<(), ForumError>) {
    let target = &punishment.target;
    match result {
        Ok(()) => info!(
            action,
            level = %target.level(),
            tid = target.tid(),
            id = target.id(),
            user = target.author().log_name(),
            note = %punishment.note,
            "executed"
        ),
        Err(e) if e.is_satisfied() => debug!(action, node = %target, error = %e, "already satisfied"),
        Err(e) => warn!(action, node = %target, error = %e, "action failed"),
    }
}

/// Logs what would have been done. Installed until production is enabled.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn execute(&self, mut punishment: Punishment) -> Option<Punishment> {
        if punishment.take_propagation() {
            return Some(punishment);
        }
        if punishment.is_action() {
            let target = &punishment.target;
            info!(
                level = %target.level(),
                tid = target.tid(),
                id = target.id(),
                user = target.author().log_name(),
                op = %punishment.op,
                ban_days = punishment.ban_days,
                reason = %punishment.reason(),
                "dry run"
            );
        }
        None
    }
}

/// Remembers every punishment it receives, in arrival order.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: std::sync::Mutex<Vec<Punishment>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingExecutor {
    pub fn calls(&self) -> Vec<Punishment> {
        crate::lock(&self.calls).clone()
    }

    pub fn len(&self) -> usize {
        crate::lock(&self.calls).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the targets that were actually acted upon.
    pub fn acted_ids(&self) -> Vec<u64> {
        crate::lock(&self.calls)
            .iter()
            .filter(|p| p.is_action() && !p.op.contains(Ops::PARENT) && !p.op.contains(Ops::GRANDPARENT))
            .map(|p| p.target.id())
            .collect()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl Executor for RecordingExecutor {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute(&self, mut punishment: Punishment) -> Option<Punishment> {
        crate::lock(&self.calls).push(punishment.clone());
        punishment.take_propagation().then_some(punishment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{always, eq};
    use rr_core::{Comment, MockForumClient, Post, Thread, User};

    fn thread() -> Arc<Thread> {
        Arc::new(Thread {
            forum_id: 1,
            tid: 10,
            pid: 11,
            ..Default::default()
        })
    }

    fn post_under(thread: &Arc<Thread>) -> Arc<Post> {
        let mut post = Post {
            forum_id: 1,
            tid: 10,
            pid: 100,
            author: User {
                user_id: 5,
                portrait: "tb.1.abc".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        post.parent = Arc::downgrade(thread);
        Arc::new(post)
    }

    fn comment_under(post: &Arc<Post>) -> Arc<Comment> {
        let mut comment = Comment {
            forum_id: 1,
            tid: 10,
            ppid: 100,
            pid: 1000,
            ..Default::default()
        };
        comment.parent = Arc::downgrade(post);
        Arc::new(comment)
    }

    #[tokio::test]
    async fn test_parent_bit_returns_residual_without_side_effects() {
        // no expectations: any client call fails the test
        let executor = ForumExecutor::new(Arc::new(MockForumClient::new()));
        let thread = thread();
        let post = post_under(&thread);
        let comment = comment_under(&post);

        let p = Punishment::new(comment, Ops::DELETE | Ops::PARENT, 3, "flood");
        let residual = executor.execute(p).await.unwrap();
        assert_eq!(residual.op, Ops::DELETE);
        assert_eq!(residual.ban_days, 3);
        assert_eq!(residual.target.id(), 1000);
    }

    #[tokio::test]
    async fn test_grandparent_bit_becomes_parent() {
        let executor = ForumExecutor::new(Arc::new(MockForumClient::new()));
        let p = Punishment::new(thread(), Ops::HIDE | Ops::GRANDPARENT, 0, "");
        let residual = executor.execute(p).await.unwrap();
        assert_eq!(residual.op, Ops::HIDE | Ops::PARENT);
    }

    #[tokio::test]
    async fn test_ban_then_delete_then_hide() {
        let mut client = MockForumClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_ban_user()
            .with(eq(1), always(), eq(3), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));
        client
            .expect_delete_content()
            .with(eq(1), eq(10), eq(100))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        client
            .expect_hide_thread()
            .with(eq(1), eq(10))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let executor = ForumExecutor::new(Arc::new(client));
        let p = Punishment::new(post_under(&thread()), Ops::DELETE | Ops::HIDE, 3, "spam");
        assert!(executor.execute(p).await.is_none());
    }

    #[tokio::test]
    async fn test_ban_conflict_retries_once_with_suggested_days() {
        let mut client = MockForumClient::new();
        client
            .expect_ban_user()
            .withf(|_, _, days, _| *days == 10)
            .times(1)
            .returning(|_, _, _, _| Err(ForumError::BanConflict { suggested_days: Some(3) }));
        client
            .expect_ban_user()
            .withf(|_, _, days, _| *days == 3)
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let executor = ForumExecutor::new(Arc::new(client));
        let p = Punishment::new(post_under(&thread()), Ops::NORMAL, 10, "");
        assert!(executor.execute(p).await.is_none());
    }

    #[tokio::test]
    async fn test_ban_conflict_without_suggestion_falls_back_to_one_day() {
        let mut client = MockForumClient::new();
        client
            .expect_ban_user()
            .withf(|_, _, days, _| *days == 10)
            .times(1)
            .returning(|_, _, _, _| Err(ForumError::BanConflict { suggested_days: None }));
        client
            .expect_ban_user()
            .withf(|_, _, days, _| *days == 1)
            .times(1)
            .returning(|_, _, _, _| Err(ForumError::BanConflict { suggested_days: None }));

        let executor = ForumExecutor::new(Arc::new(client));
        let p = Punishment::new(post_under(&thread()), Ops::NORMAL, 10, "");
        assert!(executor.execute(p).await.is_none());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_actions() {
        let mut client = MockForumClient::new();
        client
            .expect_delete_content()
            .times(1)
            .returning(|_, _, _| Err(ForumError::NotFound("post 100".into())));
        client
            .expect_hide_thread()
            .times(1)
            .returning(|_, _| Err(ForumError::Transport("reset".into())));

        let executor = ForumExecutor::new(Arc::new(client));
        let p = Punishment::new(post_under(&thread()), Ops::DELETE | Ops::HIDE, 0, "");
        assert!(executor.execute(p).await.is_none());
    }

    #[tokio::test]
    async fn test_thread_delete_addresses_opening_post() {
        let mut client = MockForumClient::new();
        client
            .expect_delete_content()
            .with(eq(1), eq(10), eq(11))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let executor = ForumExecutor::new(Arc::new(client));
        assert!(executor.execute(Punishment::delete(thread(), "")).await.is_none());
    }

    #[tokio::test]
    async fn test_no_action_is_ignored() {
        let executor = ForumExecutor::new(Arc::new(MockForumClient::new()));
        assert!(executor.execute(Punishment::none(thread())).await.is_none());
        assert!(DryRunExecutor.execute(Punishment::none(thread())).await.is_none());
    }

    #[tokio::test]
    async fn test_dry_run_still_propagates() {
        let p = Punishment::new(thread(), Ops::DELETE | Ops::PARENT, 0, "");
        assert_eq!(DryRunExecutor.execute(p).await.unwrap().op, Ops::DELETE);
    }
}
