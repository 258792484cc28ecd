use thiserror::Error;

/// Errors produced by type construction and version arithmetic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {scheme} version: {value:?}")]
    InvalidVersionFormat { value: String, scheme: &'static str },

    #[error("cannot compare {left} with {right}: different numbering schemes")]
    IncomparableVersions { left: String, right: String },

    #[error("{scheme} versions cannot bump the {part} part")]
    UnsupportedBump { scheme: &'static str, part: String },

    #[error("cannot bump the {part} part of {version}: number overflows")]
    VersionOverflow { version: String, part: String },

    #[error("invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid commit hash: {0:?}")]
    InvalidCommit(String),
}

/// Convenience type alias for type-level operations.
pub type Result<T> = std::result::Result<T, TypeError>;
