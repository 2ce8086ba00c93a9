//! # Lazy Activation
//!
//! Every level's runner starts inert so that an unconfigured level never
//! hits the forum. Registering anything at a level activates it, and the
//! activation walks up the parent links wired once at composition time so
//! that the whole path from the entry point down to that level descends.

use crate::lock;
use rr_core::Level;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// No-op; the level's producer is never invoked.
    Inert,
    /// Default orchestration installed.
    Active,
    /// A caller-supplied runner replaces the default orchestration.
    Overridden,
}

/// Runner state of one level plus the upward hook to its parent level.
#[derive(Debug)]
pub struct ActivationCell {
    level: Level,
    state: Mutex<RunnerState>,
    parent: Option<Arc<ActivationCell>>,
}

impl ActivationCell {
    pub fn root(level: Level) -> Arc<Self> {
        Arc::new(Self {
            level,
            state: Mutex::new(RunnerState::Inert),
            parent: None,
        })
    }

    pub fn child(level: Level, parent: &Arc<ActivationCell>) -> Arc<Self> {
        Arc::new(Self {
            level,
            state: Mutex::new(RunnerState::Inert),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn state(&self) -> RunnerState {
        *lock(&self.state)
    }

    /// Inert → Active for this level, then the same for every ancestor.
    /// Active and Overridden levels keep their state.
    pub fn activate(&self) {
        {
            let mut state = lock(&self.state);
            if *state == RunnerState::Inert {
                *state = RunnerState::Active;
                debug!(level = %self.level, "runner activated");
            }
        }
        if let Some(parent) = &self.parent {
            parent.activate();
        }
    }

    /// Marks this level as running caller logic and activates the ancestors.
    pub fn override_runner(&self) {
        *lock(&self.state) = RunnerState::Overridden;
        debug!(level = %self.level, "runner overridden");
        if let Some(parent) = &self.parent {
            parent.activate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Arc<ActivationCell>, Arc<ActivationCell>, Arc<ActivationCell>) {
        let root = ActivationCell::root(Level::Thread);
        let mid = ActivationCell::child(Level::Post, &root);
        let leaf = ActivationCell::child(Level::Comment, &mid);
        (root, mid, leaf)
    }

    #[test]
    fn test_leaf_activation_reaches_root() {
        let (root, mid, leaf) = chain();
        assert_eq!(root.state(), RunnerState::Inert);
        leaf.activate();
        assert_eq!(leaf.state(), RunnerState::Active);
        assert_eq!(mid.state(), RunnerState::Active);
        assert_eq!(root.state(), RunnerState::Active);
    }

    #[test]
    fn test_mid_activation_leaves_leaf_inert() {
        let (root, mid, leaf) = chain();
        mid.activate();
        assert_eq!(root.state(), RunnerState::Active);
        assert_eq!(leaf.state(), RunnerState::Inert);
    }

    #[test]
    fn test_override_survives_later_activation() {
        let (root, mid, leaf) = chain();
        mid.override_runner();
        assert_eq!(mid.state(), RunnerState::Overridden);
        assert_eq!(root.state(), RunnerState::Active);
        leaf.activate();
        assert_eq!(mid.state(), RunnerState::Overridden);
    }
}
