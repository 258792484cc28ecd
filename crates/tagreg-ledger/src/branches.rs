//! Stage membership from branch ancestry.
//!
//! Under this strategy a stage is a branch: every registered version whose
//! commit is reachable from the branch head is in the stage. Nothing is
//! written; assignments are synthesized on every read.

use std::collections::{BTreeMap, HashMap, HashSet};

use tagreg_refs::Repository;
use tagreg_types::{ArtifactName, CommitId, StageName};
use tracing::{debug, warn};

use crate::builder::StateBuilder;
use crate::error::{RegistryError, Result};
use crate::event::{Event, EventKind};
use crate::stages::StageChange;
use crate::state::RegistryState;
use crate::versions::require_artifact;

/// Derives stage assignments from the branches in a branch → stage map.
pub struct BranchManager<'a, R: ?Sized> {
    repo: &'a R,
    branch_stages: &'a BTreeMap<String, StageName>,
    depth_limit: Option<usize>,
}

impl<'a, R: Repository + ?Sized> BranchManager<'a, R> {
    /// `depth_limit` bounds how many parent links are followed from each
    /// branch head. `None` walks the full history.
    pub fn new(
        repo: &'a R,
        branch_stages: &'a BTreeMap<String, StageName>,
        depth_limit: Option<usize>,
    ) -> Self {
        Self {
            repo,
            branch_stages,
            depth_limit,
        }
    }

    /// Commits reachable from `head`, including `head` itself.
    ///
    /// Depth-first over parents. Each commit is expanded once, or again
    /// only if a depth limit is set and it is reached by a shorter path.
    pub fn ancestry(&self, head: &CommitId) -> Result<HashSet<CommitId>> {
        let mut depth_of: HashMap<CommitId, usize> = HashMap::new();
        let mut stack = vec![(head.clone(), 0usize)];

        while let Some((commit, depth)) = stack.pop() {
            if let Some(&seen) = depth_of.get(&commit) {
                if self.depth_limit.is_none() || seen <= depth {
                    continue;
                }
            }
            depth_of.insert(commit.clone(), depth);
            if self.depth_limit.is_some_and(|limit| depth >= limit) {
                continue;
            }
            for parent in self.repo.parents(&commit)? {
                stack.push((parent, depth + 1));
            }
        }

        debug!(head = %head.short(), commits = depth_of.len(), "walked ancestry");
        Ok(depth_of.into_keys().collect())
    }

    /// One synthetic assignment per (registered version, mapped branch
    /// containing it), dated at the version's latest registration.
    pub fn synthetic_assignments(&self, state: &RegistryState) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for (branch, stage) in self.branch_stages {
            let ref_name = format!("refs/heads/{branch}");
            let head = match self.repo.resolve_commit(&ref_name) {
                Ok(head) => head,
                Err(err) => {
                    warn!(%branch, %err, "skipping unmapped branch");
                    continue;
                }
            };
            let reachable = self.ancestry(&head)?;

            for artifact in state.artifacts.values() {
                for version in artifact.registered_versions() {
                    if !reachable.contains(&version.commit) {
                        continue;
                    }
                    let Some(registration) = version.registrations.last() else {
                        continue;
                    };
                    events.push(Event {
                        kind: EventKind::Assignment,
                        artifact: artifact.name.clone(),
                        version: Some(version.version.clone()),
                        stage: Some(stage.clone()),
                        counter: None,
                        timestamp: registration.timestamp,
                        author: registration.author.clone(),
                        author_email: registration.author_email.clone(),
                        commit: version.commit.clone(),
                        message: format!("Version is reachable from branch {branch}"),
                        ref_name: ref_name.clone(),
                    });
                }
            }
        }
        Ok(events)
    }

    /// The full log under the branch strategy: tag events without stage
    /// tags, plus synthetic assignments.
    pub fn events(&self, tag_events: &[Event]) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = tag_events
            .iter()
            .filter(|e| !matches!(e.kind, EventKind::Assignment | EventKind::Unassignment))
            .cloned()
            .collect();
        let state = StateBuilder::build(events.clone())?;
        events.extend(self.synthetic_assignments(&state)?);
        events.sort();
        Ok(events)
    }

    /// Succeeds without writing if `version` is already reachable from a
    /// branch mapped to `stage`. Moving a branch head is not supported.
    pub fn assign(
        &self,
        log: &[Event],
        artifact: &str,
        stage: &str,
        version: &str,
    ) -> Result<StageChange> {
        let name = ArtifactName::new(artifact)?;
        let stage = StageName::new(stage)?;
        let state = StateBuilder::build(log.to_vec())?;
        let found = require_artifact(&state, &name)?
            .registered_versions()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                RegistryError::VersionRequired(format!(
                    "artifact {name} has no registered version {version}"
                ))
            })?;

        match found.stages.get(&stage).and_then(|b| b.active_since()) {
            Some(event) => Ok(StageChange {
                event: event.clone(),
                version: found.version.clone(),
                registration: None,
            }),
            None => Err(RegistryError::Unsupported(format!(
                "stage {stage} follows branch ancestry; merge commit {} into a branch mapped to {stage} instead",
                found.commit.short()
            ))),
        }
    }

    /// Always fails: a version cannot leave a branch it was merged into.
    pub fn unassign(&self, artifact: &str, stage: &str) -> Result<StageChange> {
        Err(RegistryError::Unsupported(format!(
            "cannot unassign {artifact} from {stage}: stage follows branch ancestry"
        )))
    }
}
