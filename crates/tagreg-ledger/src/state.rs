//! Derived registry state.
//!
//! Nothing in here is persisted. [`RegistryState`] is produced by
//! [`StateBuilder`](crate::builder::StateBuilder) from the event log and
//! thrown away after the query that needed it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagreg_types::{ArtifactName, CommitId, StageName, VersionScheme, VersionValue};
use tracing::warn;

use crate::event::Event;

/// Limits on active stage bindings, applied when reading state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLimits {
    /// Maximum active stages per version. `None` is unlimited.
    pub assignments_per_version: Option<usize>,
    /// Maximum active versions per stage. `None` is unlimited. The most
    /// recently assigned versions win.
    pub versions_per_stage: Option<usize>,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            assignments_per_version: None,
            versions_per_stage: Some(1),
        }
    }
}

impl StageLimits {
    pub fn unlimited() -> Self {
        Self {
            assignments_per_version: None,
            versions_per_stage: None,
        }
    }
}

/// The assignment history of one (version, stage) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBinding {
    pub stage: StageName,
    pub assignments: Vec<Event>,
    pub unassignments: Vec<Event>,
}

impl StageBinding {
    pub fn new(stage: StageName) -> Self {
        Self {
            stage,
            assignments: Vec::new(),
            unassignments: Vec::new(),
        }
    }

    /// `true` iff the latest event of this binding is an assignment.
    pub fn is_active(&self) -> bool {
        match (self.assignments.last(), self.unassignments.last()) {
            (Some(_), None) => true,
            (Some(a), Some(u)) => a > u,
            _ => false,
        }
    }

    /// The assignment that opened the binding, if it is active.
    pub fn active_since(&self) -> Option<&Event> {
        if self.is_active() {
            self.assignments.last()
        } else {
            None
        }
    }
}

/// One version of an artifact, registered or implicit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub artifact: ArtifactName,
    /// Version identifier. For implicit versions, the commit hash.
    pub version: String,
    pub commit: CommitId,
    pub created_at: DateTime<Utc>,
    pub author: String,
    pub author_email: String,
    /// Reference the version was first seen under.
    pub ref_name: String,
    pub registrations: Vec<Event>,
    pub deregistrations: Vec<Event>,
    pub stages: BTreeMap<StageName, StageBinding>,
}

impl Version {
    /// A version named by its commit, from the event that first touched
    /// the commit.
    pub fn implicit(event: &Event) -> Self {
        Self {
            artifact: event.artifact.clone(),
            version: event.commit.to_string(),
            commit: event.commit.clone(),
            created_at: event.timestamp,
            author: event.author.clone(),
            author_email: event.author_email.clone(),
            ref_name: event.ref_name.clone(),
            registrations: Vec::new(),
            deregistrations: Vec::new(),
            stages: BTreeMap::new(),
        }
    }

    /// `true` iff the latest of the registration and deregistration
    /// events is a registration.
    pub fn is_registered(&self) -> bool {
        match (self.registrations.last(), self.deregistrations.last()) {
            (Some(_), None) => true,
            (Some(r), Some(d)) => r > d,
            _ => false,
        }
    }

    /// `true` if the version was never registered.
    pub fn is_implicit(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Time of the latest registration, if any.
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registrations.last().map(|e| e.timestamp)
    }

    /// Stages whose binding is active, ignoring limits.
    pub fn active_stages(&self) -> impl Iterator<Item = &StageName> {
        self.stages
            .values()
            .filter(|b| b.is_active())
            .map(|b| &b.stage)
    }

    /// Every event that touched this version, in log order.
    pub fn events(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .registrations
            .iter()
            .chain(&self.deregistrations)
            .chain(self.stages.values().flat_map(|b| b.assignments.iter().chain(&b.unassignments)))
            .collect();
        events.sort();
        events
    }
}

/// An active binding after limits are applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveStage<'a> {
    pub version: &'a Version,
    pub stage: &'a StageName,
    pub since: &'a Event,
}

/// Everything known about one artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: ArtifactName,
    /// Versions in the order they first appeared in the log.
    pub versions: Vec<Version>,
    pub deprecations: Vec<Event>,
}

impl Artifact {
    pub fn new(name: ArtifactName) -> Self {
        Self {
            name,
            versions: Vec::new(),
            deprecations: Vec::new(),
        }
    }

    pub fn is_deprecated(&self) -> bool {
        !self.deprecations.is_empty()
    }

    /// Look up a version by identifier.
    ///
    /// An identifier registered again at another commit has one entry per
    /// commit. The registered entry wins, then the newest.
    pub fn version(&self, id: &str) -> Option<&Version> {
        self.version_index(id).map(|i| &self.versions[i])
    }

    pub(crate) fn version_index(&self, id: &str) -> Option<usize> {
        self.versions
            .iter()
            .position(|v| v.version == id && v.is_registered())
            .or_else(|| self.versions.iter().rposition(|v| v.version == id))
    }

    /// The version a new event at `commit` attaches to: the registered
    /// version there, else a never-registered one, else the most recent
    /// deregistered one.
    pub fn version_at(&self, commit: &CommitId) -> Option<&Version> {
        self.version_index_at(commit).map(|i| &self.versions[i])
    }

    pub(crate) fn version_index_at(&self, commit: &CommitId) -> Option<usize> {
        let at_commit = || {
            self.versions
                .iter()
                .enumerate()
                .filter(|(_, v)| &v.commit == commit)
        };
        at_commit()
            .find(|(_, v)| v.is_registered())
            .or_else(|| at_commit().find(|(_, v)| v.is_implicit()))
            .or_else(|| at_commit().last())
            .map(|(i, _)| i)
    }

    pub fn registered_versions(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter().filter(|v| v.is_registered())
    }

    /// Greatest version under `scheme` among versions that were ever
    /// registered. Deregistered versions are considered only when asked.
    /// Identifiers that do not parse under `scheme` are skipped.
    pub fn latest(&self, scheme: VersionScheme, include_deregistered: bool) -> Option<&Version> {
        let mut best: Option<(VersionValue, &Version)> = None;
        for version in &self.versions {
            if version.is_implicit() || !(include_deregistered || version.is_registered()) {
                continue;
            }
            let value = match scheme.parse(&version.version) {
                Ok(value) => value,
                Err(err) => {
                    warn!(artifact = %self.name, version = %version.version, %err, "skipping unparsable version");
                    continue;
                }
            };
            let greater = match &best {
                None => true,
                Some((current, _)) => value
                    .compare(current)
                    .map(|o| o.is_gt())
                    .unwrap_or(false),
            };
            if greater {
                best = Some((value, version));
            }
        }
        best.map(|(_, v)| v)
    }

    /// Active bindings with `limits` applied, most recently assigned first.
    ///
    /// Limits apply per version first, then per stage.
    pub fn active_stages(&self, limits: StageLimits) -> Vec<ActiveStage<'_>> {
        let mut active: Vec<ActiveStage<'_>> = self
            .versions
            .iter()
            .flat_map(|version| {
                version.stages.values().filter_map(move |binding| {
                    binding.active_since().map(|since| ActiveStage {
                        version,
                        stage: &binding.stage,
                        since,
                    })
                })
            })
            .collect();
        active.sort_by_key(|a| Reverse(a.since));

        if let Some(max) = limits.assignments_per_version {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            active.retain(|a| {
                let n = seen.entry(a.version.version.as_str()).or_default();
                *n += 1;
                *n <= max
            });
        }
        if let Some(max) = limits.versions_per_stage {
            let mut seen: HashMap<&StageName, usize> = HashMap::new();
            active.retain(|a| {
                let n = seen.entry(a.stage).or_default();
                *n += 1;
                *n <= max
            });
        }
        active
    }

    /// Versions currently in `stage`, most recently assigned first.
    pub fn versions_in_stage(&self, stage: &StageName, limits: StageLimits) -> Vec<&Version> {
        self.active_stages(limits)
            .into_iter()
            .filter(|a| a.stage == stage)
            .map(|a| a.version)
            .collect()
    }

    /// Every event that touched this artifact, in log order.
    pub fn events(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .versions
            .iter()
            .flat_map(Version::events)
            .chain(&self.deprecations)
            .collect();
        events.sort();
        events.dedup();
        events
    }
}

/// Folded registry state: every artifact the log mentions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    pub artifacts: BTreeMap<ArtifactName, Artifact>,
}

impl RegistryState {
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Every stage that has at least one binding, sorted.
    pub fn stages(&self) -> Vec<&StageName> {
        let mut stages: Vec<&StageName> = self
            .artifacts
            .values()
            .flat_map(|a| a.versions.iter())
            .flat_map(|v| v.stages.keys())
            .collect();
        stages.sort();
        stages.dedup();
        stages
    }
}
