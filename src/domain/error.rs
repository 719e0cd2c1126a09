//! Domain error types for inline review tracking.
//!
//! These errors represent failures callers are expected to match on. Adapter
//! code (git, gh) reports through `anyhow` and is wrapped at the session
//! boundary.

use thiserror::Error;

/// Errors raised while parsing unified diff text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("Invalid diff line change char: '{0}'.")]
    InvalidDiffLineChar(char),

    #[error("Invalid diff chunk header: {0}")]
    InvalidChunkHeader(String),
}

/// Errors related to pull request session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to post review comment: {0:#}")]
    PostFailed(anyhow::Error),

    #[error("No local repository is active")]
    NoRepository,

    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("Session operation failed: {0}")]
    OperationFailed(#[from] anyhow::Error),
}
