//! # Domain Models
//!
//! The three reviewable levels of a forum: a [`Thread`] owns [`Post`]s and a
//! [`Post`] owns [`Comment`]s. Nodes are fetched fresh every review cycle and
//! never persisted; children keep a weak link to their parent that is only
//! used to re-target punishments.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

/// Position of a node in the content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Thread,
    Post,
    Comment,
}

impl Level {
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Thread => None,
            Level::Post => Some(Level::Thread),
            Level::Comment => Some(Level::Post),
        }
    }

    pub fn child(self) -> Option<Level> {
        match self {
            Level::Thread => Some(Level::Post),
            Level::Post => Some(Level::Comment),
            Level::Comment => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Thread => "thread",
            Level::Post => "post",
            Level::Comment => "comment",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The author of a node as reported by the forum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    /// Stable handle used by the forum for moderation calls
    #[serde(default)]
    pub portrait: String,
    #[serde(default)]
    pub name: String,
    /// Forum experience level (not the reviewer permission level)
    #[serde(default)]
    pub level: u32,
}

impl User {
    pub fn log_name(&self) -> &str {
        if self.name.is_empty() {
            &self.portrait
        } else {
            &self.name
        }
    }
}

/// Parent of the root level: one listing page of a forum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumPage {
    pub forum: String,
    pub page: u32,
}

/// A top-level topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thread {
    #[serde(default)]
    pub forum_id: u64,
    pub tid: u64,
    /// Id of the opening post, used when the whole thread is deleted
    #[serde(default)]
    pub pid: u64,
    pub author: User,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_num: u32,
    /// Unix timestamp of the latest reply; the thread's liveness tag
    #[serde(default)]
    pub last_time: i64,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub is_livepost: bool,
}

/// A reply inside a thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub forum_id: u64,
    pub tid: u64,
    pub pid: u64,
    #[serde(default)]
    pub floor: u32,
    pub author: User,
    #[serde(default)]
    pub text: String,
    /// Number of comments under this post; the post's liveness tag
    #[serde(default)]
    pub reply_num: u32,
    #[serde(default)]
    pub create_time: i64,
    /// Comment preview shipped with the post listing
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(skip)]
    pub parent: Weak<Thread>,
}

/// A sub-reply under a post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub forum_id: u64,
    pub tid: u64,
    /// Id of the owning post
    pub ppid: u64,
    pub pid: u64,
    pub author: User,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(skip)]
    pub parent: Weak<Post>,
}

/// Behaviour shared by the three node kinds.
pub trait Content: fmt::Debug + Send + Sync + Sized + 'static {
    const LEVEL: Level;

    /// What a producer of this level is given to list children of.
    type Parent: Send + Sync + 'static;

    fn id(&self) -> u64;

    fn author(&self) -> &User;

    fn text(&self) -> &str;

    /// Monotonically-informative marker used by the dedup stage.
    fn liveness(&self) -> i64;

    /// Links the node to the parent it was produced from.
    fn attach(&mut self, parent: &Arc<Self::Parent>);

    fn into_node(self: Arc<Self>) -> ContentNode;

    fn validate(&self) -> Result<(), ReviewError> {
        if self.id() == 0 {
            return Err(ReviewError::Data(format!("{} without an id", Self::LEVEL)));
        }
        Ok(())
    }
}

impl Content for Thread {
    const LEVEL: Level = Level::Thread;
    type Parent = ForumPage;

    fn id(&self) -> u64 {
        self.tid
    }

    fn author(&self) -> &User {
        &self.author
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn liveness(&self) -> i64 {
        self.last_time
    }

    fn attach(&mut self, _parent: &Arc<ForumPage>) {}

    fn into_node(self: Arc<Self>) -> ContentNode {
        ContentNode::Thread(self)
    }
}

impl Content for Post {
    const LEVEL: Level = Level::Post;
    type Parent = Thread;

    fn id(&self) -> u64 {
        self.pid
    }

    fn author(&self) -> &User {
        &self.author
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn liveness(&self) -> i64 {
        i64::from(self.reply_num)
    }

    fn attach(&mut self, parent: &Arc<Thread>) {
        self.parent = Arc::downgrade(parent);
    }

    fn into_node(self: Arc<Self>) -> ContentNode {
        ContentNode::Post(self)
    }
}

impl Content for Comment {
    const LEVEL: Level = Level::Comment;
    type Parent = Post;

    fn id(&self) -> u64 {
        self.pid
    }

    fn author(&self) -> &User {
        &self.author
    }

    fn text(&self) -> &str {
        &self.text
    }

    // Comments cannot be edited or replied to, so presence alone is the tag.
    fn liveness(&self) -> i64 {
        0
    }

    fn attach(&mut self, parent: &Arc<Post>) {
        self.parent = Arc::downgrade(parent);
    }

    fn into_node(self: Arc<Self>) -> ContentNode {
        ContentNode::Comment(self)
    }
}

/// Any reviewable node, as carried by a punishment.
#[derive(Debug, Clone)]
pub enum ContentNode {
    Thread(Arc<Thread>),
    Post(Arc<Post>),
    Comment(Arc<Comment>),
}

impl ContentNode {
    pub fn level(&self) -> Level {
        match self {
            ContentNode::Thread(_) => Level::Thread,
            ContentNode::Post(_) => Level::Post,
            ContentNode::Comment(_) => Level::Comment,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            ContentNode::Thread(t) => t.tid,
            ContentNode::Post(p) => p.pid,
            ContentNode::Comment(c) => c.pid,
        }
    }

    pub fn forum_id(&self) -> u64 {
        match self {
            ContentNode::Thread(t) => t.forum_id,
            ContentNode::Post(p) => p.forum_id,
            ContentNode::Comment(c) => c.forum_id,
        }
    }

    pub fn tid(&self) -> u64 {
        match self {
            ContentNode::Thread(t) => t.tid,
            ContentNode::Post(p) => p.tid,
            ContentNode::Comment(c) => c.tid,
        }
    }

    /// The post id a delete call should address.
    pub fn pid(&self) -> u64 {
        match self {
            ContentNode::Thread(t) => t.pid,
            ContentNode::Post(p) => p.pid,
            ContentNode::Comment(c) => c.pid,
        }
    }

    pub fn author(&self) -> &User {
        match self {
            ContentNode::Thread(t) => &t.author,
            ContentNode::Post(p) => &p.author,
            ContentNode::Comment(c) => &c.author,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ContentNode::Thread(t) => &t.text,
            ContentNode::Post(p) => &p.text,
            ContentNode::Comment(c) => &c.text,
        }
    }

    /// Follows the weak back-reference; `None` for threads or when the
    /// parent has already been dropped.
    pub fn parent(&self) -> Option<ContentNode> {
        match self {
            ContentNode::Thread(_) => None,
            ContentNode::Post(p) => p.parent.upgrade().map(ContentNode::Thread),
            ContentNode::Comment(c) => c.parent.upgrade().map(ContentNode::Post),
        }
    }

    /// Identity comparison: same level and same id.
    pub fn same_as(&self, other: &ContentNode) -> bool {
        self.level() == other.level() && self.id() == other.id()
    }
}

impl From<Arc<Thread>> for ContentNode {
    fn from(thread: Arc<Thread>) -> Self {
        ContentNode::Thread(thread)
    }
}

impl From<Arc<Post>> for ContentNode {
    fn from(post: Arc<Post>) -> Self {
        ContentNode::Post(post)
    }
}

impl From<Arc<Comment>> for ContentNode {
    fn from(comment: Arc<Comment>) -> Self {
        ContentNode::Comment(comment)
    }
}

impl fmt::Display for ContentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tid={} pid={}", self.level(), self.tid(), self.pid())
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total_pages: u32,
}
