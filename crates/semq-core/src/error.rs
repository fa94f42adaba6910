//! Error types for semq.
//!
//! Compilation distinguishes three kinds of failure:
//! - degradations (oversized queries, concept cycles, unsupported
//!   comparators) are **not** errors; they surface as diagnostics next to a
//!   usable plan,
//! - [`LookupError`] means a collaborator could not answer and the caller
//!   may retry,
//! - everything else in [`SemqError`] is a defect in the surrounding system.

use thiserror::Error;

/// Top-level result type for semq operations.
pub type Result<T> = std::result::Result<T, SemqError>;

/// Top-level error type for semq.
#[derive(Debug, Error)]
pub enum SemqError {
    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("malformed collaborator response: {0}")]
    MalformedResponse(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SemqError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only collaborator outages qualify; malformed responses and internal
    /// errors will fail the same way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }
}

/// Failure of an external lookup collaborator (hierarchy, entity or
/// concept storage).
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{collaborator} lookup unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("{collaborator} lookup failed for '{key}': {reason}")]
    Failed {
        collaborator: &'static str,
        key: String,
        reason: String,
    },
}
