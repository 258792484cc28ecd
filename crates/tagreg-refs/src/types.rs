//! Records read from and written to the host repository.

use serde::{Deserialize, Serialize};
use tagreg_types::{CommitId, Signature};

/// A tag as stored in the host repository, peeled to its commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Short tag name (without `refs/tags/`).
    pub name: String,
    /// Commit the tag points at.
    pub target: CommitId,
    /// Tagger identity and tag creation time. For lightweight tags this is
    /// the commit's author and commit time.
    pub tagger: Signature,
    /// Tag message (first paragraph).
    pub message: String,
    /// `false` for lightweight tags.
    pub annotated: bool,
}

/// A commit with its parent links.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub parents: Vec<CommitId>,
    /// Author identity, dated at commit time.
    pub author: Signature,
    /// Commit subject line.
    pub message: String,
}

/// A local branch and the commit at its tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHead {
    pub name: String,
    pub target: CommitId,
}

impl BranchHead {
    /// Canonical ref name, e.g. `refs/heads/main`.
    pub fn canonical_name(&self) -> String {
        format!("refs/heads/{}", self.name)
    }
}

/// Request to create an annotated tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTag {
    pub name: String,
    pub target: CommitId,
    pub message: String,
    /// Explicit tagger. When `None` the repository's configured identity and
    /// current time are used.
    pub tagger: Option<Signature>,
}

impl NewTag {
    pub fn new(name: impl Into<String>, target: CommitId, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target,
            message: message.into(),
            tagger: None,
        }
    }

    pub fn with_tagger(mut self, tagger: Signature) -> Self {
        self.tagger = Some(tagger);
        self
    }
}
