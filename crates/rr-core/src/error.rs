//! # Errors
//!
//! Centralized error handling for the reviewer.
//! Forum transport failures, store failures and pipeline failures each get
//! their own enum so callers can tell "retry", "skip" and "fatal" apart.

use thiserror::Error;

/// Failures reported by a [`crate::ForumClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForumError {
    /// The service refused the ban duration (e.g. a ban is already pending).
    /// Retried once with the suggested duration.
    #[error("ban conflict (suggested duration: {suggested_days:?} day(s))")]
    BanConflict { suggested_days: Option<u32> },

    /// The target no longer exists.
    #[error("{0} not found")]
    NotFound(String),

    /// The target was already deleted, hidden or banned.
    #[error("already actioned: {0}")]
    AlreadyActioned(String),

    /// Network or protocol failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered with something we could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ForumError {
    /// Outcomes an executor treats as "the action already holds".
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyActioned(_))
    }
}

/// Failures reported by the permission and dedup stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The primary error type of the review pipeline.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// An external client call failed.
    #[error("transport error: {0}")]
    Transport(#[from] ForumError),

    /// A node is missing required fields; only that node is skipped.
    #[error("data error: {0}")]
    Data(String),

    /// The pipeline was composed with invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A caller-supplied producer, filter, checker or runner failed.
    #[error(transparent)]
    Check(#[from] anyhow::Error),
}

/// A specialized Result type for reviewer logic.
pub type Result<T> = std::result::Result<T, ReviewError>;
