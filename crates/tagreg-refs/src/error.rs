//! Error types for repository operations.

use thiserror::Error;

/// Errors that can occur while reading or writing the host repository.
#[derive(Debug, Error)]
pub enum RefError {
    /// The revision does not resolve to a commit.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A tag with this name already exists. Tags are never overwritten.
    #[error("tag already exists: {0}")]
    TagExists(String),

    /// The tag does not exist.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// The name is not a valid git ref name.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// A `git` invocation failed.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// Output from `git` could not be interpreted.
    #[error("unexpected git output: {0}")]
    Parse(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// I/O error while spawning or talking to `git`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for repository operations.
pub type Result<T> = std::result::Result<T, RefError>;
