//! Artifact metadata supplied from outside the tag log.
//!
//! The registry log records which versions exist and where they sit. What
//! an artifact *is* (its type, path and labels) and which commits carry it
//! come from an [`Enrichment`] implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tagreg_types::{ArtifactName, CommitId};

use crate::error::SdkResult;

/// Descriptive metadata for one artifact at one commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescription {
    /// Artifact type, checked against the configured `types`.
    pub kind: Option<String>,
    pub path: Option<String>,
    pub labels: Vec<String>,
    pub description: Option<String>,
}

impl ArtifactDescription {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }
}

/// Source of artifact annotations.
pub trait Enrichment: Send + Sync {
    /// Artifacts annotated at `commit`.
    fn artifacts_at(&self, commit: &CommitId) -> SdkResult<Vec<ArtifactName>>;

    /// Metadata for `artifact` at `commit`, if annotated there.
    fn describe(
        &self,
        artifact: &ArtifactName,
        commit: &CommitId,
    ) -> SdkResult<Option<ArtifactDescription>>;
}

/// Annotates nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEnrichment;

impl Enrichment for NoEnrichment {
    fn artifacts_at(&self, _commit: &CommitId) -> SdkResult<Vec<ArtifactName>> {
        Ok(Vec::new())
    }

    fn describe(
        &self,
        _artifact: &ArtifactName,
        _commit: &CommitId,
    ) -> SdkResult<Option<ArtifactDescription>> {
        Ok(None)
    }
}

/// Fixed in-memory annotation table, keyed by commit.
#[derive(Clone, Debug, Default)]
pub struct StaticEnrichment {
    entries: BTreeMap<CommitId, BTreeMap<ArtifactName, ArtifactDescription>>,
}

impl StaticEnrichment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticEnrichment::insert`].
    pub fn annotate(
        mut self,
        commit: CommitId,
        artifact: ArtifactName,
        description: ArtifactDescription,
    ) -> Self {
        self.insert(commit, artifact, description);
        self
    }

    /// Annotate `artifact` at `commit`, replacing any earlier entry.
    pub fn insert(
        &mut self,
        commit: CommitId,
        artifact: ArtifactName,
        description: ArtifactDescription,
    ) {
        self.entries
            .entry(commit)
            .or_default()
            .insert(artifact, description);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Enrichment for StaticEnrichment {
    fn artifacts_at(&self, commit: &CommitId) -> SdkResult<Vec<ArtifactName>> {
        Ok(self
            .entries
            .get(commit)
            .map(|artifacts| artifacts.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn describe(
        &self,
        artifact: &ArtifactName,
        commit: &CommitId,
    ) -> SdkResult<Option<ArtifactDescription>> {
        Ok(self
            .entries
            .get(commit)
            .and_then(|artifacts| artifacts.get(artifact))
            .cloned())
    }
}
