//! # Punishments
//!
//! [`Ops`] is a plain bit-set. `HIDE` and `DELETE` are action flags;
//! `PARENT` and `GRANDPARENT` are propagation directives layered onto the
//! same field, telling the executor to re-apply the action one or two levels
//! above the current target instead of at it.

use crate::models::ContentNode;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::panic::Location;

/// Bit-set of pending operations.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ops(u8);

impl Ops {
    pub const NORMAL: Ops = Ops(0);
    /// Explicitly cleared by a whitelist; never acted upon.
    pub const EXEMPT: Ops = Ops(1);
    pub const HIDE: Ops = Ops(2);
    pub const DELETE: Ops = Ops(4);
    pub const PARENT: Ops = Ops(8);
    pub const GRANDPARENT: Ops = Ops(16);

    const NAMES: [(Ops, &'static str); 5] = [
        (Ops::EXEMPT, "EXEMPT"),
        (Ops::HIDE, "HIDE"),
        (Ops::DELETE, "DELETE"),
        (Ops::PARENT, "PARENT"),
        (Ops::GRANDPARENT, "GRANDPARENT"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Unknown bits are dropped.
    pub const fn from_bits_truncate(bits: u8) -> Ops {
        Ops(bits & 0b1_1111)
    }

    pub const fn is_normal(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Ops) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Ops) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Ops) {
        self.0 &= !other.0;
    }

    /// Parses a single flag name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Ops> {
        if name.eq_ignore_ascii_case("NORMAL") {
            return Some(Ops::NORMAL);
        }
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(op, _)| *op)
    }
}

impl BitOr for Ops {
    type Output = Ops;

    fn bitor(self, rhs: Ops) -> Ops {
        Ops(self.0 | rhs.0)
    }
}

impl BitOrAssign for Ops {
    fn bitor_assign(&mut self, rhs: Ops) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Ops {
    type Output = Ops;

    fn bitand(self, rhs: Ops) -> Ops {
        Ops(self.0 & rhs.0)
    }
}

impl fmt::Debug for Ops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_normal() {
            return f.write_str("NORMAL");
        }
        let mut first = true;
        for (op, name) in Self::NAMES {
            if self.contains(op) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Ops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pending or resolved moderation action.
///
/// `op == NORMAL` with `ban_days == 0` is the canonical "no action" value;
/// see [`Punishment::is_action`].
#[derive(Debug, Clone)]
pub struct Punishment {
    pub target: ContentNode,
    pub op: Ops,
    pub ban_days: u32,
    pub note: String,
    origin: &'static Location<'static>,
}

impl Punishment {
    /// Creates a punishment stamped with the caller's source location.
    #[track_caller]
    pub fn new(target: impl Into<ContentNode>, op: Ops, ban_days: u32, note: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            op,
            ban_days,
            note: note.into(),
            origin: Location::caller(),
        }
    }

    /// The "no action" value for `target`.
    #[track_caller]
    pub fn none(target: impl Into<ContentNode>) -> Self {
        Self::new(target, Ops::NORMAL, 0, "")
    }

    #[track_caller]
    pub fn delete(target: impl Into<ContentNode>, note: impl Into<String>) -> Self {
        Self::new(target, Ops::DELETE, 0, note)
    }

    #[track_caller]
    pub fn hide(target: impl Into<ContentNode>, note: impl Into<String>) -> Self {
        Self::new(target, Ops::HIDE, 0, note)
    }

    /// False only for the canonical "no action" value.
    pub fn is_action(&self) -> bool {
        !self.op.is_normal() || self.ban_days > 0
    }

    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    /// The note prefixed with the creating call site, for audit logs and ban reasons.
    pub fn reason(&self) -> String {
        let file = self
            .origin
            .file()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        if self.note.is_empty() {
            format!("{}:{}", file, self.origin.line())
        } else {
            format!("{}:{} {}", file, self.origin.line(), self.note)
        }
    }

    pub fn retarget(&mut self, target: impl Into<ContentNode>) {
        self.target = target.into();
    }

    /// Moves the punishment to its target's parent; false if there is none.
    pub fn retarget_to_parent(&mut self) -> bool {
        match self.target.parent() {
            Some(parent) => {
                self.target = parent;
                true
            }
            None => false,
        }
    }

    /// Consumes one propagation step: `PARENT` is cleared, `GRANDPARENT`
    /// becomes `PARENT`. Returns true when a step was taken, meaning the
    /// punishment must be re-targeted upward instead of executed.
    pub fn take_propagation(&mut self) -> bool {
        if self.op.contains(Ops::PARENT) {
            self.op.remove(Ops::PARENT);
            true
        } else if self.op.contains(Ops::GRANDPARENT) {
            self.op.remove(Ops::GRANDPARENT);
            self.op.insert(Ops::PARENT);
            true
        } else {
            false
        }
    }
}

/// Severity-max: the larger `ban_days` wins, ties go to the larger `op`.
/// Full ties keep the left-hand side.
impl BitOr for Punishment {
    type Output = Punishment;

    fn bitor(self, rhs: Punishment) -> Punishment {
        if (rhs.ban_days, rhs.op) > (self.ban_days, self.op) {
            rhs
        } else {
            self
        }
    }
}

impl BitOrAssign for Punishment {
    fn bitor_assign(&mut self, rhs: Punishment) {
        if (rhs.ban_days, rhs.op) > (self.ban_days, self.op) {
            *self = rhs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, Post, Thread};
    use std::sync::Arc;

    fn post(pid: u64) -> Arc<Post> {
        Arc::new(Post {
            pid,
            ..Default::default()
        })
    }

    fn keys(p: &Punishment) -> (u32, Ops) {
        (p.ban_days, p.op)
    }

    #[test]
    fn test_normal_without_ban_is_not_an_action() {
        let p = Punishment::none(post(1));
        assert!(!p.is_action());
        assert!(Punishment::new(post(1), Ops::NORMAL, 1, "").is_action());
        assert!(Punishment::new(post(1), Ops::HIDE, 0, "").is_action());
    }

    #[test]
    fn test_combination_is_commutative_and_associative() {
        let samples = [
            Punishment::new(post(1), Ops::DELETE, 0, "a"),
            Punishment::new(post(2), Ops::HIDE, 3, "b"),
            Punishment::new(post(3), Ops::DELETE | Ops::PARENT, 3, "c"),
            Punishment::none(post(4)),
            Punishment::new(post(5), Ops::NORMAL, 10, "e"),
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(keys(&(a.clone() | b.clone())), keys(&(b.clone() | a.clone())));
                for c in &samples {
                    let left = (a.clone() | b.clone()) | c.clone();
                    let right = a.clone() | (b.clone() | c.clone());
                    assert_eq!(keys(&left), keys(&right));
                }
            }
        }
    }

    #[test]
    fn test_longer_ban_beats_stronger_op() {
        let delete = Punishment::new(post(1), Ops::DELETE, 0, "");
        let ban = Punishment::new(post(2), Ops::NORMAL, 1, "");
        let merged = delete | ban;
        assert_eq!(merged.ban_days, 1);
        assert_eq!(merged.target.id(), 2);
    }

    #[test]
    fn test_propagation_steps() {
        let comment = Arc::new(Comment {
            pid: 9,
            ..Default::default()
        });
        let mut p = Punishment::new(comment, Ops::DELETE | Ops::GRANDPARENT, 0, "");
        assert!(p.take_propagation());
        assert_eq!(p.op, Ops::DELETE | Ops::PARENT);
        assert!(p.take_propagation());
        assert_eq!(p.op, Ops::DELETE);
        assert!(!p.take_propagation());
    }

    #[test]
    fn test_retarget_follows_weak_parent() {
        let thread = Arc::new(Thread {
            tid: 7,
            ..Default::default()
        });
        let mut child = Post {
            pid: 70,
            ..Default::default()
        };
        crate::models::Content::attach(&mut child, &thread);
        let mut p = Punishment::delete(Arc::new(child), "spam");
        assert!(p.retarget_to_parent());
        assert_eq!(p.target.id(), 7);
        assert!(!p.retarget_to_parent());
    }

    #[test]
    fn test_reason_carries_call_site() {
        let p = Punishment::delete(post(1), "flood");
        assert!(p.reason().starts_with("punish.rs:"));
        assert!(p.reason().ends_with(" flood"));
    }

    #[test]
    fn test_ops_names_round_trip() {
        assert_eq!(Ops::from_name("delete"), Some(Ops::DELETE));
        assert_eq!(Ops::from_name("Grandparent"), Some(Ops::GRANDPARENT));
        assert_eq!(Ops::from_name("bogus"), None);
        assert_eq!(format!("{:?}", Ops::DELETE | Ops::PARENT), "DELETE | PARENT");
    }
}
