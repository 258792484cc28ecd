//! High-level SDK for tagreg.
//!
//! Provides [`Registry`], the single entry point for applications that
//! keep an artifact registry in a git repository, together with its
//! `.tagreg.toml` configuration and the [`Enrichment`] seam for artifact
//! metadata.

pub mod config;
pub mod enrichment;
pub mod error;
pub mod registry;

pub use config::{RegistryConfig, StageStrategy, CONFIG_FILE};
pub use enrichment::{ArtifactDescription, Enrichment, NoEnrichment, StaticEnrichment};
pub use error::{SdkError, SdkResult};
pub use registry::{ArtifactSummary, HistoryOrder, Registry};

// Re-export key types
pub use tagreg_ledger::{
    AssignRequest, Artifact, DoctorReport, Event, EventKind, RegistryError, StageChange,
    Version, Violation, ViolationKind,
};
pub use tagreg_refs::{GitRepository, InMemoryRepository, Repository};
pub use tagreg_types::{ArtifactName, BumpPart, CommitId, StageName, VersionScheme};
