use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tagreg_ledger::{
    tag_events, AssignRequest, Artifact, BranchManager, DoctorReport, Event, LedgerSettings,
    LogDoctor, RegistryError, RegistryState, StageChange, StageManager, StateBuilder, Version,
    VersionManager,
};
use tagreg_refs::{decode, GitRepository, Repository};
use tagreg_types::{ArtifactName, BumpPart, StageName};
use tracing::{debug, warn};

use crate::config::{RegistryConfig, StageStrategy};
use crate::enrichment::{ArtifactDescription, Enrichment, NoEnrichment};
use crate::error::{SdkError, SdkResult};

/// Order of [`Registry::history`] results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistoryOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// One line of the artifact listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub name: ArtifactName,
    pub latest: Option<String>,
    pub registered: usize,
    pub deprecated: bool,
    /// Effective versions per stage, most recently assigned first.
    pub stages: BTreeMap<StageName, Vec<String>>,
}

/// The main tagreg handle.
///
/// Wraps a host repository and its configuration. Every query collects the
/// log again and folds it from scratch; nothing is cached between calls.
pub struct Registry<R: Repository> {
    repo: R,
    config: RegistryConfig,
    settings: LedgerSettings,
    enrichment: Box<dyn Enrichment>,
}

impl Registry<GitRepository> {
    /// Open the git working copy at `path` and its `.tagreg.toml`.
    pub fn open(path: impl AsRef<Path>) -> SdkResult<Self> {
        let repo = GitRepository::open(path.as_ref())?;
        let config = RegistryConfig::load(repo.workdir())?;
        Self::new(repo, config)
    }
}

impl<R: Repository> Registry<R> {
    pub fn new(repo: R, config: RegistryConfig) -> SdkResult<Self> {
        config.validate()?;
        let settings = config.ledger_settings();
        Ok(Self {
            repo,
            config,
            settings,
            enrichment: Box::new(NoEnrichment),
        })
    }

    pub fn with_enrichment(mut self, enrichment: impl Enrichment + 'static) -> Self {
        self.enrichment = Box::new(enrichment);
        self
    }

    // ---- Log ----

    /// The full event log under the configured strategies, in log order.
    pub fn events(&self) -> SdkResult<Vec<Event>> {
        let mut events = tag_events(&self.repo)?;
        if self.config.commit_is_a_version {
            events.extend(self.creation_events()?);
        }
        if self.config.stage_strategy == StageStrategy::Branches {
            events = self.branch_manager().events(&events)?;
        }
        events.sort();
        debug!(events = events.len(), "collected registry log");
        Ok(events)
    }

    pub fn state(&self) -> SdkResult<RegistryState> {
        Ok(StateBuilder::build(self.events()?)?)
    }

    fn creation_events(&self) -> SdkResult<Vec<Event>> {
        let mut events = Vec::new();
        for commit in self.repo.commits()? {
            let artifacts = self.enrichment.artifacts_at(&commit)?;
            if artifacts.is_empty() {
                continue;
            }
            let info = self.repo.commit(&commit)?;
            events.extend(artifacts.into_iter().map(|a| Event::creation(a, &info)));
        }
        Ok(events)
    }

    fn branch_manager(&self) -> BranchManager<'_, R> {
        BranchManager::new(
            &self.repo,
            &self.config.branch_stages,
            self.config.ancestry_depth_limit,
        )
    }

    // ---- Queries ----

    /// Every artifact the log mentions, by name.
    pub fn artifacts(&self) -> SdkResult<Vec<ArtifactSummary>> {
        let state = self.state()?;
        Ok(state
            .artifacts
            .values()
            .map(|artifact| {
                let mut stages: BTreeMap<StageName, Vec<String>> = BTreeMap::new();
                for active in artifact.active_stages(self.settings.limits) {
                    stages
                        .entry(active.stage.clone())
                        .or_default()
                        .push(active.version.version.clone());
                }
                ArtifactSummary {
                    name: artifact.name.clone(),
                    latest: artifact
                        .latest(self.settings.scheme, false)
                        .map(|v| v.version.clone()),
                    registered: artifact.registered_versions().count(),
                    deprecated: artifact.is_deprecated(),
                    stages,
                }
            })
            .collect())
    }

    /// Full derived state of one artifact.
    pub fn show(&self, artifact: &str) -> SdkResult<Artifact> {
        let name = ArtifactName::new(artifact)?;
        let mut state = self.state()?;
        state
            .artifacts
            .remove(&name)
            .ok_or_else(|| RegistryError::ArtifactNotFound(name.to_string()).into())
    }

    /// Greatest registered version. `None` for an unknown artifact.
    pub fn latest(&self, artifact: &str, include_deregistered: bool) -> SdkResult<Option<Version>> {
        let name = ArtifactName::new(artifact)?;
        let state = self.state()?;
        Ok(state
            .artifact(name.as_str())
            .and_then(|a| a.latest(self.settings.scheme, include_deregistered))
            .cloned())
    }

    /// The most recently assigned version in `stage`.
    pub fn which(&self, artifact: &str, stage: &str) -> SdkResult<Option<Version>> {
        Ok(self.which_all(artifact, stage)?.into_iter().next())
    }

    /// Every effective version in `stage`, most recently assigned first.
    pub fn which_all(&self, artifact: &str, stage: &str) -> SdkResult<Vec<Version>> {
        let name = ArtifactName::new(artifact)?;
        let stage = StageName::new(stage)?;
        let state = self.state()?;
        Ok(state
            .artifact(name.as_str())
            .map(|a| {
                a.versions_in_stage(&stage, self.settings.limits)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Like [`Registry::which`], but an empty stage is an error.
    pub fn require_which(&self, artifact: &str, stage: &str) -> SdkResult<Version> {
        self.which(artifact, stage)?.ok_or_else(|| {
            RegistryError::NoActiveLabel {
                artifact: artifact.to_string(),
                stage: stage.to_string(),
            }
            .into()
        })
    }

    /// Events behind a registry tag name, or every event at the commit
    /// `rev` resolves to.
    ///
    /// Best effort: failures are logged and yield no events.
    pub fn check_ref(&self, rev: &str) -> Vec<Event> {
        let lookup = || -> SdkResult<Vec<Event>> {
            let events = self.events()?;
            if decode(rev).is_some() {
                return Ok(events.into_iter().filter(|e| e.ref_name == rev).collect());
            }
            let commit = self.repo.resolve_commit(rev)?;
            Ok(events.into_iter().filter(|e| e.commit == commit).collect())
        };
        match lookup() {
            Ok(events) => events,
            Err(err) => {
                warn!(%rev, %err, "check-ref found nothing");
                Vec::new()
            }
        }
    }

    /// Events of one artifact, or of all of them.
    pub fn history(&self, artifact: Option<&str>, order: HistoryOrder) -> SdkResult<Vec<Event>> {
        let mut events = self.events()?;
        if let Some(artifact) = artifact {
            let name = ArtifactName::new(artifact)?;
            events.retain(|e| e.artifact == name);
            if events.is_empty() {
                return Err(RegistryError::ArtifactNotFound(name.to_string()).into());
            }
        }
        if order == HistoryOrder::NewestFirst {
            events.reverse();
        }
        Ok(events)
    }

    /// Configured stages together with every stage the log binds.
    pub fn stages(&self) -> SdkResult<Vec<StageName>> {
        let state = self.state()?;
        let mut stages: Vec<StageName> = self
            .config
            .stages
            .iter()
            .chain(self.config.branch_stages.values())
            .chain(state.stages())
            .cloned()
            .collect();
        stages.sort();
        stages.dedup();
        Ok(stages)
    }

    /// Enrichment metadata for `artifact` at `rev` (default `HEAD`).
    pub fn describe(&self, artifact: &str, rev: Option<&str>) -> SdkResult<Option<ArtifactDescription>> {
        let name = ArtifactName::new(artifact)?;
        let commit = self.repo.resolve_commit(rev.unwrap_or("HEAD"))?;
        let description = self.enrichment.describe(&name, &commit)?;
        if let Some(kind) = description.as_ref().and_then(|d| d.kind.as_deref()) {
            if !self.config.allows_type(kind) {
                return Err(SdkError::UnknownType {
                    kind: kind.to_string(),
                    allowed: self.config.types.clone(),
                });
            }
        }
        Ok(description)
    }

    pub fn doctor(&self) -> SdkResult<DoctorReport> {
        Ok(LogDoctor::examine(&self.repo, self.settings.scheme)?)
    }

    // ---- Mutations ----

    pub fn register(
        &self,
        artifact: &str,
        rev: &str,
        version: Option<&str>,
        bump: Option<BumpPart>,
    ) -> SdkResult<Version> {
        let log = self.events()?;
        Ok(VersionManager::new(&self.repo, &self.settings).register(&log, artifact, rev, version, bump)?)
    }

    pub fn deregister(&self, artifact: &str, version: &str) -> SdkResult<Version> {
        let log = self.events()?;
        Ok(VersionManager::new(&self.repo, &self.settings).deregister(&log, artifact, version)?)
    }

    /// Assign a version to `stage`.
    ///
    /// Under the branch strategy nothing is written: the call succeeds only
    /// if the version is already reachable from a branch mapped to `stage`.
    pub fn assign(&self, artifact: &str, stage: &str, request: &AssignRequest) -> SdkResult<StageChange> {
        let log = self.events()?;
        match self.config.stage_strategy {
            StageStrategy::Tags => {
                Ok(StageManager::new(&self.repo, &self.settings).assign(&log, artifact, stage, request)?)
            }
            StageStrategy::Branches => {
                let version = self.registered_version_for(&log, artifact, request)?;
                Ok(self.branch_manager().assign(&log, artifact, stage, &version)?)
            }
        }
    }

    pub fn unassign(&self, artifact: &str, stage: &str, version: Option<&str>) -> SdkResult<StageChange> {
        match self.config.stage_strategy {
            StageStrategy::Tags => {
                let log = self.events()?;
                Ok(StageManager::new(&self.repo, &self.settings).unassign(&log, artifact, stage, version)?)
            }
            StageStrategy::Branches => Ok(self.branch_manager().unassign(artifact, stage)?),
        }
    }

    pub fn deprecate(&self, artifact: &str) -> SdkResult<Event> {
        let log = self.events()?;
        Ok(VersionManager::new(&self.repo, &self.settings).deprecate(&log, artifact)?)
    }

    /// The version an assign request names, resolving a revision to the
    /// version registered at its commit.
    fn registered_version_for(
        &self,
        log: &[Event],
        artifact: &str,
        request: &AssignRequest,
    ) -> SdkResult<String> {
        match (&request.version, &request.rev) {
            (Some(version), None) => Ok(version.clone()),
            (None, Some(rev)) => {
                let name = ArtifactName::new(artifact)?;
                let commit = self.repo.resolve_commit(rev)?;
                let state = StateBuilder::build(log.to_vec())?;
                state
                    .artifact(name.as_str())
                    .and_then(|a| a.registered_versions().find(|v| v.commit == commit))
                    .map(|v| v.version.clone())
                    .ok_or_else(|| {
                        RegistryError::Unsupported(format!(
                            "no version of {name} is registered at {}; register it before relying on branch stages",
                            commit.short()
                        ))
                        .into()
                    })
            }
            _ => Err(RegistryError::WrongArgs("pass exactly one of a version or a revision".into()).into()),
        }
    }

    // ---- Accessors ----

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::StaticEnrichment;
    use tagreg_ledger::EventKind;
    use tagreg_refs::{InMemoryRepository, RefError};
    use tagreg_types::{timestamp_from_secs, CommitId, VersionScheme};

    fn repo() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.freeze_clock(timestamp_from_secs(1_700_000_000)).unwrap();
        repo
    }

    fn commit(repo: &InMemoryRepository, msg: &str) -> CommitId {
        repo.advance_clock(1).unwrap();
        repo.create_commit(msg).unwrap()
    }

    fn registry(config: RegistryConfig) -> (Registry<InMemoryRepository>, CommitId) {
        let repo = repo();
        let c1 = commit(&repo, "c1");
        (Registry::new(repo, config).unwrap(), c1)
    }

    #[test]
    fn conflict_scenario() {
        let (reg, c1) = registry(RegistryConfig::default());
        let c2 = commit(reg.repo(), "c2");

        let v = reg.register("rf", c1.as_str(), Some("v1.2.3"), None).unwrap();
        assert_eq!(v.version, "v1.2.3");
        assert_eq!(v.ref_name, "rf@v1.2.3");

        for rev in [&c1, &c2] {
            let err = reg.register("rf", rev.as_str(), Some("v1.2.3"), None).unwrap_err();
            assert!(matches!(
                err,
                SdkError::Registry(RegistryError::VersionAlreadyRegistered { .. })
            ));
        }
        let err = reg.register("rf", c1.as_str(), Some("v2.0.0"), None).unwrap_err();
        assert!(matches!(
            err,
            SdkError::Registry(RegistryError::VersionExistsForCommit { .. })
        ));
        assert_eq!(reg.repo().tags().unwrap().len(), 1);
    }

    #[test]
    fn stage_scenario() {
        let (reg, c1) = registry(RegistryConfig::default());
        reg.register("rf", c1.as_str(), Some("v1.2.3"), None).unwrap();
        reg.repo().advance_clock(1).unwrap();

        let change = reg
            .assign("rf", "production", &AssignRequest::version("v1.2.3"))
            .unwrap();
        assert_eq!(change.event.ref_name, "rf#production#1");
        assert_eq!(reg.which("rf", "production").unwrap().unwrap().version, "v1.2.3");
        assert_eq!(reg.require_which("rf", "production").unwrap().version, "v1.2.3");

        reg.repo().advance_clock(1).unwrap();
        reg.unassign("rf", "production", None).unwrap();
        assert!(reg.which("rf", "production").unwrap().is_none());
        let err = reg.require_which("rf", "production").unwrap_err();
        assert!(matches!(
            err,
            SdkError::Registry(RegistryError::NoActiveLabel { .. })
        ));
    }

    #[test]
    fn scan_example() {
        let repo = repo();
        let c1 = commit(&repo, "c1");
        let c2 = commit(&repo, "c2");
        let nn = ArtifactName::new("nn").unwrap();
        let table = StaticEnrichment::new()
            .annotate(c1.clone(), nn.clone(), ArtifactDescription::of_kind("model"))
            .annotate(c2.clone(), nn.clone(), ArtifactDescription::of_kind("model"));
        let config = RegistryConfig {
            version_scheme: VersionScheme::Numbered,
            commit_is_a_version: true,
            ..RegistryConfig::default()
        };
        let reg = Registry::new(repo, config).unwrap().with_enrichment(table);

        reg.repo().advance_clock(1).unwrap();
        reg.register("nn", c1.as_str(), Some("v1"), None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.assign("nn", "staging", &AssignRequest::rev(c1.as_str())).unwrap();

        let artifact = reg.show("nn").unwrap();
        assert_eq!(artifact.versions.len(), 2);

        let v1 = artifact.version("v1").unwrap();
        assert!(v1.is_registered());
        assert_eq!(v1.commit, c1);
        assert_eq!(v1.active_stages().map(|s| s.as_str()).collect::<Vec<_>>(), vec!["staging"]);

        let scanned = artifact.version(c2.as_str()).unwrap();
        assert!(scanned.is_implicit());
        assert!(!scanned.is_registered());
        assert!(scanned.stages.is_empty());

        assert_eq!(reg.latest("nn", false).unwrap().unwrap().version, "v1");
        let creations = reg
            .history(Some("nn"), HistoryOrder::OldestFirst)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::Creation)
            .count();
        assert_eq!(creations, 2);
    }

    #[test]
    fn check_ref_by_tag_and_commit() {
        let (reg, c1) = registry(RegistryConfig::default());
        let c2 = commit(reg.repo(), "c2");
        reg.register("rf", c1.as_str(), Some("v1.0.0"), None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.assign("rf", "prod", &AssignRequest::version("v1.0.0")).unwrap();
        reg.register("nn", c2.as_str(), None, None).unwrap();

        let by_tag = reg.check_ref("rf#prod#1");
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].kind, EventKind::Assignment);

        let by_commit = reg.check_ref(c1.as_str());
        assert_eq!(by_commit.len(), 2);
        assert!(by_commit.iter().all(|e| e.artifact.as_str() == "rf"));

        assert!(reg.check_ref("no-such-rev").is_empty());
        assert!(reg.check_ref("rf@v9.9.9").is_empty());
    }

    #[test]
    fn history_order_and_filter() {
        let (reg, c1) = registry(RegistryConfig::default());
        let c2 = commit(reg.repo(), "c2");
        reg.register("rf", c1.as_str(), None, None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.register("rf", c2.as_str(), None, None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.register("nn", c2.as_str(), None, None).unwrap();

        let newest: Vec<_> = reg
            .history(None, HistoryOrder::default())
            .unwrap()
            .into_iter()
            .map(|e| e.ref_name)
            .collect();
        assert_eq!(newest, vec!["nn@v0.0.1", "rf@v0.0.2", "rf@v0.0.1"]);

        let oldest: Vec<_> = reg
            .history(Some("rf"), HistoryOrder::OldestFirst)
            .unwrap()
            .into_iter()
            .map(|e| e.ref_name)
            .collect();
        assert_eq!(oldest, vec!["rf@v0.0.1", "rf@v0.0.2"]);

        let err = reg.history(Some("missing"), HistoryOrder::default()).unwrap_err();
        assert!(matches!(err, SdkError::Registry(RegistryError::ArtifactNotFound(_))));
    }

    #[test]
    fn branch_strategy() {
        let repo = repo();
        let c1 = commit(&repo, "c1");
        repo.set_branch("release", &c1).unwrap();
        let c2 = commit(&repo, "c2");
        let config = RegistryConfig {
            stage_strategy: StageStrategy::Branches,
            branch_stages: [
                ("main".to_string(), StageName::new("staging").unwrap()),
                ("release".to_string(), StageName::new("prod").unwrap()),
            ]
            .into_iter()
            .collect(),
            ..RegistryConfig::default()
        };
        let reg = Registry::new(repo, config).unwrap();

        reg.register("rf", c1.as_str(), Some("v1.0.0"), None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.register("rf", c2.as_str(), Some("v1.1.0"), None).unwrap();

        assert_eq!(reg.which("rf", "prod").unwrap().unwrap().version, "v1.0.0");
        assert_eq!(reg.which("rf", "staging").unwrap().unwrap().version, "v1.1.0");

        let change = reg.assign("rf", "prod", &AssignRequest::rev(c1.as_str())).unwrap();
        assert_eq!(change.event.ref_name, "refs/heads/release");
        assert_eq!(change.version, "v1.0.0");

        let err = reg.assign("rf", "prod", &AssignRequest::version("v1.1.0")).unwrap_err();
        assert!(matches!(err, SdkError::Registry(RegistryError::Unsupported(_))));
        let err = reg.unassign("rf", "staging", None).unwrap_err();
        assert!(matches!(err, SdkError::Registry(RegistryError::Unsupported(_))));

        // Nothing was written besides the two registrations.
        assert_eq!(reg.repo().tags().unwrap().len(), 2);
        let mut stages: Vec<_> = reg.stages().unwrap().into_iter().map(|s| s.to_string()).collect();
        stages.sort();
        assert_eq!(stages, vec!["prod", "staging"]);
    }

    #[test]
    fn describe_checks_types() {
        let repo = repo();
        let head = commit(&repo, "c1");
        let rf = ArtifactName::new("rf").unwrap();
        let ds = ArtifactName::new("ds").unwrap();
        let table = StaticEnrichment::new()
            .annotate(head.clone(), rf.clone(), ArtifactDescription::of_kind("model"))
            .annotate(head.clone(), ds.clone(), ArtifactDescription::of_kind("dataset"));
        let config = RegistryConfig {
            types: vec!["model".into()],
            ..RegistryConfig::default()
        };
        let reg = Registry::new(repo, config).unwrap().with_enrichment(table);

        let described = reg.describe("rf", None).unwrap().unwrap();
        assert_eq!(described.kind.as_deref(), Some("model"));
        assert!(reg.describe("nn", Some(head.as_str())).unwrap().is_none());

        let err = reg.describe("ds", None).unwrap_err();
        assert!(matches!(err, SdkError::UnknownType { ref kind, .. } if kind == "dataset"));
    }

    #[test]
    fn listing_and_deprecation() {
        let (reg, c1) = registry(RegistryConfig {
            stages: vec![StageName::new("dev").unwrap(), StageName::new("prod").unwrap()],
            ..RegistryConfig::default()
        });
        reg.register("rf", c1.as_str(), Some("v1.0.0"), None).unwrap();
        reg.repo().advance_clock(1).unwrap();
        reg.assign("rf", "prod", &AssignRequest::version("v1.0.0")).unwrap();

        let err = reg
            .assign("rf", "qa", &AssignRequest::version("v1.0.0"))
            .unwrap_err();
        assert!(matches!(err, SdkError::Registry(RegistryError::UnknownStage { .. })));

        reg.repo().advance_clock(1).unwrap();
        reg.deprecate("rf").unwrap();

        let listing = reg.artifacts().unwrap();
        assert_eq!(listing.len(), 1);
        let summary = &listing[0];
        assert_eq!(summary.latest.as_deref(), Some("v1.0.0"));
        assert_eq!(summary.registered, 1);
        assert!(summary.deprecated);
        assert_eq!(summary.stages[&StageName::new("prod").unwrap()], vec!["v1.0.0"]);

        let stages: Vec<_> = reg.stages().unwrap().into_iter().map(|s| s.to_string()).collect();
        assert_eq!(stages, vec!["dev", "prod"]);
        assert!(reg.doctor().unwrap().is_healthy());
    }

    #[test]
    fn errors_propagate() {
        let (reg, _) = registry(RegistryConfig::default());
        let err = reg.register("rf", "nope", None, None).unwrap_err();
        assert!(matches!(
            err,
            SdkError::Registry(RegistryError::Ref(RefError::RefNotFound(_)))
        ));
        assert!(matches!(
            reg.show("rf").unwrap_err(),
            SdkError::Registry(RegistryError::ArtifactNotFound(_))
        ));
        assert!(reg.latest("rf", true).unwrap().is_none());
        assert!(Registry::new(
            InMemoryRepository::new(),
            RegistryConfig {
                stage_strategy: StageStrategy::Branches,
                ..RegistryConfig::default()
            }
        )
        .is_err());
    }
}
