//! rusty-reviewer/crates/rr-core/src/lib.rs
//!
//! The central domain model and interface definitions for the reviewer.

pub mod error;
pub mod models;
pub mod punish;
pub mod records;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use punish::*;
pub use records::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use std::sync::Arc;

    #[test]
    fn test_post_deserializes_without_parent() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "forum_id": 1,
            "tid": 10,
            "pid": 100,
            "author": { "user_id": 5, "name": "alice" },
            "text": "Hello Rust!",
            "reply_num": 2
        }))
        .unwrap();
        assert_eq!(post.pid, 100);
        assert_eq!(post.liveness(), 2);
        assert!(post.parent.upgrade().is_none());
    }

    #[test]
    fn test_node_accessors_and_parent_link() {
        let thread = Arc::new(Thread {
            forum_id: 1,
            tid: 10,
            pid: 11,
            ..Default::default()
        });
        let mut post = Post {
            forum_id: 1,
            tid: 10,
            pid: 100,
            ..Default::default()
        };
        post.attach(&thread);
        let node = Arc::new(post).into_node();
        assert_eq!(node.level(), Level::Post);
        let parent = node.parent().unwrap();
        assert_eq!(parent.pid(), 11);
        assert!(parent.same_as(&ContentNode::Thread(thread)));
    }

    #[test]
    fn test_missing_id_is_a_data_error() {
        let comment = Comment::default();
        assert!(matches!(comment.validate(), Err(crate::ReviewError::Data(_))));
    }

    #[test]
    fn test_level_walk() {
        assert_eq!(Level::Comment.parent(), Some(Level::Post));
        assert_eq!(Level::Thread.child(), Some(Level::Post));
        assert_eq!(Level::Thread.parent(), None);
    }
}
