use tagreg_refs::RefError;
use tagreg_types::TypeError;
use thiserror::Error;

/// Errors produced while folding the event log or validating a mutation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("version {version} of artifact {artifact} is already registered")]
    VersionAlreadyRegistered { artifact: String, version: String },

    #[error("commit {commit} already has version {version} of artifact {artifact} registered")]
    VersionExistsForCommit {
        artifact: String,
        commit: String,
        version: String,
    },

    #[error("version required: {0}")]
    VersionRequired(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("artifact {artifact}: {count} versions match {query}")]
    ManyVersions {
        artifact: String,
        query: String,
        count: usize,
    },

    #[error("artifact {artifact} has no active version in stage {stage}")]
    NoActiveLabel { artifact: String, stage: String },

    #[error("unknown stage {stage:?}; allowed stages: {allowed:?}")]
    UnknownStage { stage: String, allowed: Vec<String> },

    #[error("wrong arguments: {0}")]
    WrongArgs(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Ref(#[from] RefError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
