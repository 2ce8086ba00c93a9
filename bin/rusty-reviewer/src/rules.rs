//! # Keyword Rules
//!
//! Config-driven checkers: a node whose text contains any keyword of a rule
//! gets that rule's punishment. Rules are tried in file order and the first
//! match wins.

use crate::config::RuleConfig;
use anyhow::{bail, Context};
use rr_core::{Comment, Content, Level, Ops, Post, Punishment, Thread, User};
use rr_review::{check_fn, CheckResult, CheckerOptions, Pipeline};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct KeywordRule {
    keywords: Vec<String>,
    ops: Ops,
    ban_days: u32,
    note: String,
    min_user_level: Option<u32>,
}

impl KeywordRule {
    pub fn compile(config: &RuleConfig) -> anyhow::Result<Self> {
        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            bail!("{} rule without keywords", config.level);
        }

        let mut ops = Ops::NORMAL;
        for name in &config.op {
            ops |= Ops::from_name(name).with_context(|| format!("unknown op {name:?}"))?;
        }
        if ops.is_normal() && config.ban_days == 0 {
            bail!("{} rule {:?} would never act", config.level, keywords);
        }

        Ok(Self {
            keywords,
            ops,
            ban_days: config.ban_days,
            note: config.note.clone(),
            min_user_level: config.min_user_level,
        })
    }

    fn exempts(&self, author: &User) -> bool {
        self.min_user_level.is_some_and(|min| author.level >= min)
    }

    fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// First matching rule applied to `node`.
pub fn verdict<N: Content>(rules: &[KeywordRule], node: Arc<N>, text: &str) -> Option<Punishment> {
    let rule = rules
        .iter()
        .find(|rule| !rule.exempts(node.author()) && rule.matches(text))?;
    Some(Punishment::new(node.into_node(), rule.ops, rule.ban_days, rule.note.clone()))
}

fn compile_level(configs: &[RuleConfig], level: Level) -> anyhow::Result<Arc<Vec<KeywordRule>>> {
    let rules = configs
        .iter()
        .filter(|c| c.level == level)
        .map(KeywordRule::compile)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Arc::new(rules))
}

/// Registers one checker per level that has rules. Returns the number of
/// rules installed.
pub fn install(pipeline: &Pipeline, configs: &[RuleConfig]) -> anyhow::Result<usize> {
    let threads = compile_level(configs, Level::Thread)?;
    let posts = compile_level(configs, Level::Post)?;
    let comments = compile_level(configs, Level::Comment)?;
    let total = threads.len() + posts.len() + comments.len();

    if !threads.is_empty() {
        info!(level = %Level::Thread, rules = threads.len(), "keyword rules installed");
        pipeline.threads().set_checker(
            CheckerOptions::default(),
            check_fn(move |thread: Arc<Thread>| {
                let text = format!("{}\n{}", thread.title, thread.text);
                let punishment = verdict(&threads, thread, &text);
                async move { CheckResult::Ok(punishment) }
            }),
        );
    }
    if !posts.is_empty() {
        info!(level = %Level::Post, rules = posts.len(), "keyword rules installed");
        pipeline.posts().set_checker(
            CheckerOptions::default(),
            check_fn(move |post: Arc<Post>| {
                let text = post.text.clone();
                let punishment = verdict(&posts, post, &text);
                async move { CheckResult::Ok(punishment) }
            }),
        );
    }
    if !comments.is_empty() {
        info!(level = %Level::Comment, rules = comments.len(), "keyword rules installed");
        pipeline.comments().set_checker(
            CheckerOptions::default(),
            check_fn(move |comment: Arc<Comment>| {
                let text = comment.text.clone();
                let punishment = verdict(&comments, comment, &text);
                async move { CheckResult::Ok(punishment) }
            }),
        );
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rr_forum_snapshot::{Snapshot, SnapshotForum};
    use rr_review::RunnerState;
    use rr_store_memory::MemoryStore;

    fn rule(level: Level, keywords: &[&str], op: &[&str]) -> RuleConfig {
        RuleConfig {
            level,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            op: op.iter().map(|o| o.to_string()).collect(),
            ban_days: 0,
            note: "matched".into(),
            min_user_level: None,
        }
    }

    fn post(text: &str, level: u32) -> Arc<Post> {
        Arc::new(Post {
            pid: 1,
            text: text.into(),
            author: User {
                user_id: 1,
                level,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_compile_rejects_bad_rules() {
        assert!(KeywordRule::compile(&rule(Level::Post, &["x"], &["EXPLODE"])).is_err());
        assert!(KeywordRule::compile(&rule(Level::Post, &["  "], &["DELETE"])).is_err());
        assert!(KeywordRule::compile(&rule(Level::Post, &["x"], &["NORMAL"])).is_err());
    }

    #[test]
    fn test_first_match_wins_case_insensitively() {
        let rules = vec![
            KeywordRule::compile(&rule(Level::Post, &["casino"], &["DELETE", "PARENT"])).unwrap(),
            KeywordRule::compile(&rule(Level::Post, &["casino", "lottery"], &["HIDE"])).unwrap(),
        ];
        let p = verdict(&rules, post("Best CASINO in town", 1), "Best CASINO in town").unwrap();
        assert_eq!(p.op, Ops::DELETE | Ops::PARENT);

        let p = verdict(&rules, post("lottery", 1), "lottery").unwrap();
        assert_eq!(p.op, Ops::HIDE);

        assert!(verdict(&rules, post("hello", 1), "hello").is_none());
    }

    #[test]
    fn test_senior_authors_are_exempt() {
        let mut config = rule(Level::Post, &["casino"], &["DELETE"]);
        config.min_user_level = Some(7);
        let rules = vec![KeywordRule::compile(&config).unwrap()];
        assert!(verdict(&rules, post("casino", 9), "casino").is_none());
        assert!(verdict(&rules, post("casino", 3), "casino").is_some());
    }

    #[test]
    fn test_install_activates_only_configured_levels() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::builder()
            .client(Arc::new(SnapshotForum::from_snapshot(Snapshot::default())))
            .permissions(store.clone())
            .dedup(store)
            .build()
            .unwrap();

        let installed = install(&pipeline, &[rule(Level::Post, &["casino"], &["DELETE"])]).unwrap();
        assert_eq!(installed, 1);
        assert_eq!(pipeline.state(Level::Post), RunnerState::Active);
        assert_eq!(pipeline.state(Level::Thread), RunnerState::Active);
        assert_eq!(pipeline.state(Level::Comment), RunnerState::Inert);
    }
}
