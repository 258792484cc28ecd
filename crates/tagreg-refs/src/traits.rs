//! The [`Repository`] trait defining what tagreg needs from a host VCS.

use std::collections::{HashSet, VecDeque};

use tagreg_types::{CommitId, Signature};

use crate::error::{RefError, Result};
use crate::types::{BranchHead, CommitInfo, NewTag, TagRecord};

/// Access to a host version-control repository.
///
/// Implementations must make [`create_tag`](Repository::create_tag) atomic:
/// of two callers racing to create the same name, exactly one succeeds and
/// the other receives [`RefError::TagExists`]. Nothing else in tagreg
/// coordinates concurrent writers.
pub trait Repository: Send + Sync {
    /// Resolve a revision (commit hash or prefix, branch, tag, `HEAD`) to a
    /// commit.
    fn resolve_commit(&self, rev: &str) -> Result<CommitId>;

    /// Read a commit by id.
    fn commit(&self, id: &CommitId) -> Result<CommitInfo>;

    /// List every tag that points (possibly through a tag object) at a
    /// commit, sorted by name.
    fn tags(&self) -> Result<Vec<TagRecord>>;

    /// Read a tag by short name. Returns `Ok(None)` if it does not exist.
    fn tag(&self, name: &str) -> Result<Option<TagRecord>>;

    /// Create an annotated tag iff no tag with that name exists.
    fn create_tag(&self, tag: &NewTag) -> Result<TagRecord>;

    /// List local branches, sorted by name.
    fn branches(&self) -> Result<Vec<BranchHead>>;

    /// The identity new tags are written with, stamped with the current time.
    fn default_signature(&self) -> Result<Signature>;

    /// Names of all tags.
    fn tag_names(&self) -> Result<Vec<String>> {
        Ok(self.tags()?.into_iter().map(|t| t.name).collect())
    }

    /// Read a tag that must exist.
    fn read_tag(&self, name: &str) -> Result<TagRecord> {
        self.tag(name)?
            .ok_or_else(|| RefError::TagNotFound(name.to_string()))
    }

    /// Parent commits of `id`.
    fn parents(&self, id: &CommitId) -> Result<Vec<CommitId>> {
        Ok(self.commit(id)?.parents)
    }

    /// Every commit reachable from any branch head, each listed once.
    fn commits(&self) -> Result<Vec<CommitId>> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<CommitId> = VecDeque::new();

        for branch in self.branches()? {
            if visited.insert(branch.target.clone()) {
                queue.push_back(branch.target);
            }
        }

        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
            order.push(current);
        }

        Ok(order)
    }
}
