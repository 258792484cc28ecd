//! Stage assignment and unassignment through tags.

use serde::Serialize;
use tagreg_refs::{Repository, TagAction};
use tagreg_types::{ArtifactName, CommitId, StageName};
use tracing::debug;

use crate::builder::StateBuilder;
use crate::error::{RegistryError, Result};
use crate::event::Event;
use crate::settings::LedgerSettings;
use crate::state::Version;
use crate::versions::{require_artifact, VersionManager};
use crate::writer::append;

/// What to assign to a stage.
///
/// Exactly one of `version` and `rev` must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignRequest {
    /// A registered version of the artifact.
    pub version: Option<String>,
    /// Any revision; a version is registered at its commit if needed.
    pub rev: Option<String>,
    /// Version to register when `rev` has none. Defaults to the next bump.
    pub register_as: Option<String>,
    /// Assign the bare commit without registering a version.
    pub skip_registration: bool,
    /// Write the assignment even if the version is already in the stage.
    pub force: bool,
}

impl AssignRequest {
    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    pub fn rev(rev: impl Into<String>) -> Self {
        Self {
            rev: Some(rev.into()),
            ..Self::default()
        }
    }
}

/// The outcome of a stage mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageChange {
    /// The assignment or unassignment written (or inferred).
    pub event: Event,
    /// Identifier of the version the stage now points at or away from.
    pub version: String,
    /// Registration written on the way, if the assignment registered one.
    pub registration: Option<Event>,
}

/// Write path for stage tags.
pub struct StageManager<'a, R: ?Sized> {
    repo: &'a R,
    settings: &'a LedgerSettings,
}

impl<'a, R: Repository + ?Sized> StageManager<'a, R> {
    pub fn new(repo: &'a R, settings: &'a LedgerSettings) -> Self {
        Self { repo, settings }
    }

    /// Assign a version of `artifact` to `stage`.
    ///
    /// When assigning by revision and no version is registered at the
    /// commit, one is registered first unless `skip_registration` is set.
    /// The registration and the assignment are two separate tags.
    pub fn assign(
        &self,
        log: &[Event],
        artifact: &str,
        stage: &str,
        request: &AssignRequest,
    ) -> Result<StageChange> {
        match (&request.version, &request.rev) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(RegistryError::WrongArgs(
                    "pass exactly one of a version or a revision".into(),
                ))
            }
        }
        if request.version.is_some() && request.register_as.is_some() {
            return Err(RegistryError::WrongArgs(
                "a version to register can only be given with a revision".into(),
            ));
        }
        let name = ArtifactName::new(artifact)?;
        let stage = StageName::new(stage)?;
        self.settings.check_stage(&stage)?;

        let state = StateBuilder::build(log.to_vec())?;
        let mut events = log.to_vec();
        let mut registration = None;

        let commit: CommitId = match (&request.version, &request.rev) {
            (Some(version), _) => state
                .artifact(name.as_str())
                .and_then(|a| a.registered_versions().find(|v| &v.version == version))
                .map(|v| v.commit.clone())
                .ok_or_else(|| {
                    RegistryError::VersionRequired(format!(
                        "artifact {name} has no registered version {version}"
                    ))
                })?,
            (None, Some(rev)) => {
                let commit = self.repo.resolve_commit(rev)?;
                let registered_here = state
                    .artifact(name.as_str())
                    .and_then(|a| a.version_at(&commit))
                    .filter(|v| v.is_registered());
                match registered_here {
                    Some(existing) => {
                        if let Some(wanted) = &request.register_as {
                            if wanted != &existing.version {
                                return Err(RegistryError::VersionExistsForCommit {
                                    artifact: name.to_string(),
                                    commit: commit.to_string(),
                                    version: existing.version.clone(),
                                });
                            }
                        }
                    }
                    None if !request.skip_registration => {
                        let registered = VersionManager::new(self.repo, self.settings).register(
                            log,
                            name.as_str(),
                            commit.as_str(),
                            request.register_as.as_deref(),
                            None,
                        )?;
                        if let Some(event) = registered.registrations.last() {
                            events.push(event.clone());
                            registration = Some(event.clone());
                        }
                    }
                    None => {}
                }
                commit
            }
            (None, None) => {
                return Err(RegistryError::WrongArgs(
                    "pass exactly one of a version or a revision".into(),
                ))
            }
        };

        let state = StateBuilder::build(events)?;
        let current = state.artifact(name.as_str());
        let target = current.and_then(|a| a.version_at(&commit));
        let already_active = match (current, target) {
            (Some(a), Some(v)) => a
                .versions_in_stage(&stage, self.settings.limits)
                .iter()
                .any(|active| active.version == v.version),
            _ => false,
        };
        if already_active && !request.force {
            return Err(RegistryError::WrongArgs(format!(
                "artifact {name} is already in stage {stage} at this version; use force to reassign"
            )));
        }

        let version = target
            .map(|v| v.version.clone())
            .unwrap_or_else(|| commit.to_string());
        debug!(artifact = %name, %stage, %version, "assigning");

        let event = append(
            self.repo,
            &name,
            TagAction::Assign(stage.clone()),
            self.settings.stage_naming(),
            &commit,
            format!("Assigning stage {stage} to artifact {name} version {version}"),
        )?;
        Ok(StageChange {
            event,
            version,
            registration,
        })
    }

    /// Close the binding of `stage` for `artifact`.
    ///
    /// Without `version`, the stage must hold exactly one version.
    pub fn unassign(
        &self,
        log: &[Event],
        artifact: &str,
        stage: &str,
        version: Option<&str>,
    ) -> Result<StageChange> {
        let name = ArtifactName::new(artifact)?;
        let stage = StageName::new(stage)?;
        self.settings.check_stage(&stage)?;

        let state = StateBuilder::build(log.to_vec())?;
        let existing = require_artifact(&state, &name)?;
        let no_active = || RegistryError::NoActiveLabel {
            artifact: name.to_string(),
            stage: stage.to_string(),
        };

        let target: &Version = match version {
            Some(id) => {
                let found = existing.version(id).ok_or_else(|| {
                    RegistryError::VersionRequired(format!("artifact {name} has no version {id}"))
                })?;
                if !found.stages.get(&stage).is_some_and(|b| b.is_active()) {
                    return Err(no_active());
                }
                found
            }
            None => match existing
                .versions_in_stage(&stage, self.settings.limits)
                .as_slice()
            {
                [] => return Err(no_active()),
                [one] => *one,
                many => {
                    return Err(RegistryError::ManyVersions {
                        artifact: name.to_string(),
                        query: format!("stage {stage}"),
                        count: many.len(),
                    })
                }
            },
        };

        let event = append(
            self.repo,
            &name,
            TagAction::Unassign(stage.clone()),
            self.settings.stage_naming(),
            &target.commit,
            format!(
                "Unassigning stage {stage} from artifact {name} version {}",
                target.version
            ),
        )?;
        Ok(StageChange {
            event,
            version: target.version.clone(),
            registration: None,
        })
    }
}
