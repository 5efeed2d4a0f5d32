//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    /// The name is not a valid bookmark, tag, or workspace name.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A conflicted target must hold at least two commits.
    #[error("conflicted target needs at least two commits, got {0}")]
    DegenerateConflict(usize),
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
