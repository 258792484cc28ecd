//! Registration, deregistration and deprecation.

use std::cmp::Ordering;

use tagreg_refs::{Repository, TagAction};
use tagreg_types::{ArtifactName, BumpPart, TypeError, VersionScheme, VersionValue};
use tracing::debug;

use crate::builder::StateBuilder;
use crate::error::{RegistryError, Result};
use crate::event::Event;
use crate::settings::LedgerSettings;
use crate::state::{Artifact, RegistryState, Version};
use crate::writer::append;

/// Write path for version lifecycle events.
///
/// Every call rebuilds state from `log`, validates, and appends exactly one
/// tag.
pub struct VersionManager<'a, R: ?Sized> {
    repo: &'a R,
    settings: &'a LedgerSettings,
}

impl<'a, R: Repository + ?Sized> VersionManager<'a, R> {
    pub fn new(repo: &'a R, settings: &'a LedgerSettings) -> Self {
        Self { repo, settings }
    }

    /// Register a version of `artifact` at the commit `rev` resolves to.
    ///
    /// Without an explicit `version`, the greatest registered version is
    /// bumped by `bump` (default: the scheme's smallest part), or the
    /// scheme's minimal version is used for a new artifact.
    pub fn register(
        &self,
        log: &[Event],
        artifact: &str,
        rev: &str,
        version: Option<&str>,
        bump: Option<BumpPart>,
    ) -> Result<Version> {
        if version.is_some() && bump.is_some() {
            return Err(RegistryError::WrongArgs(
                "pass either an explicit version or a bump part, not both".into(),
            ));
        }
        let name = ArtifactName::new(artifact)?;
        let commit = self.repo.resolve_commit(rev)?;
        let scheme = self.settings.scheme;
        let explicit = version.map(|v| scheme.parse(v)).transpose()?;

        let state = StateBuilder::build(log.to_vec())?;
        let registered = match state.artifact(name.as_str()) {
            Some(existing) => registered_values(existing, scheme)?,
            None => Vec::new(),
        };

        if let Some(value) = &explicit {
            let duplicate = registered
                .iter()
                .find(|(existing, _)| existing.compare(value).is_ok_and(Ordering::is_eq));
            if let Some((_, existing)) = duplicate {
                return Err(RegistryError::VersionAlreadyRegistered {
                    artifact: name.to_string(),
                    version: existing.version.clone(),
                });
            }
        }
        if let Some((_, existing)) = registered.iter().find(|(_, v)| v.commit == commit) {
            return Err(RegistryError::VersionExistsForCommit {
                artifact: name.to_string(),
                commit: commit.to_string(),
                version: existing.version.clone(),
            });
        }

        let next = match explicit {
            Some(value) => value,
            None => {
                let part = bump.unwrap_or_else(|| scheme.default_bump());
                let latest = registered
                    .iter()
                    .map(|(value, _)| value)
                    .max_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
                match latest {
                    Some(latest) => latest.bump(part)?,
                    None => {
                        // Reject parts the scheme cannot bump even when
                        // there is nothing to bump yet.
                        scheme.minimal().bump(part)?;
                        scheme.minimal()
                    }
                }
            }
        };
        debug!(artifact = %name, version = %next, commit = %commit.short(), "registering");

        let id = next.to_string();
        let event = append(
            self.repo,
            &name,
            TagAction::Register(id.clone()),
            self.settings.version_naming(),
            &commit,
            format!("Registering artifact {name} version {id}"),
        )?;
        rebuilt_version(log, event, &name, &id)
    }

    /// Deregister the registered version `version` of `artifact`.
    ///
    /// The tag is anchored at the commit the version was registered at.
    pub fn deregister(&self, log: &[Event], artifact: &str, version: &str) -> Result<Version> {
        let name = ArtifactName::new(artifact)?;
        let state = StateBuilder::build(log.to_vec())?;
        let existing = require_artifact(&state, &name)?;

        let matches: Vec<&Version> = existing
            .registered_versions()
            .filter(|v| v.version == version)
            .collect();
        let target = match matches.as_slice() {
            [] => {
                return Err(RegistryError::VersionRequired(format!(
                    "artifact {name} has no registered version {version}"
                )))
            }
            [one] => *one,
            many => {
                return Err(RegistryError::ManyVersions {
                    artifact: name.to_string(),
                    query: version.to_string(),
                    count: many.len(),
                })
            }
        };

        let event = append(
            self.repo,
            &name,
            TagAction::Deregister(version.to_string()),
            self.settings.version_naming(),
            &target.commit,
            format!("Deregistering artifact {name} version {version}"),
        )?;
        rebuilt_version(log, event, &name, version)
    }

    /// Mark `artifact` deprecated. The tag is anchored at the commit of
    /// the artifact's latest event.
    pub fn deprecate(&self, log: &[Event], artifact: &str) -> Result<Event> {
        let name = ArtifactName::new(artifact)?;
        let state = StateBuilder::build(log.to_vec())?;
        let existing = require_artifact(&state, &name)?;
        if existing.is_deprecated() {
            return Err(RegistryError::WrongArgs(format!(
                "artifact {name} is already deprecated"
            )));
        }
        let anchor = existing
            .events()
            .last()
            .map(|e| e.commit.clone())
            .ok_or_else(|| RegistryError::ArtifactNotFound(name.to_string()))?;

        append(
            self.repo,
            &name,
            TagAction::Deprecate,
            self.settings.version_naming(),
            &anchor,
            format!("Deprecating artifact {name}"),
        )
    }
}

pub(crate) fn require_artifact<'s>(state: &'s RegistryState, name: &ArtifactName) -> Result<&'s Artifact> {
    state
        .artifact(name.as_str())
        .ok_or_else(|| RegistryError::ArtifactNotFound(name.to_string()))
}

/// Parse every registered version of `artifact` under `scheme`. A version
/// written under another scheme makes the artifact's history incomparable.
fn registered_values(artifact: &Artifact, scheme: VersionScheme) -> Result<Vec<(VersionValue, &Version)>> {
    artifact
        .registered_versions()
        .map(|v| {
            scheme
                .parse(&v.version)
                .map(|value| (value, v))
                .map_err(|_| {
                    RegistryError::from(TypeError::IncomparableVersions {
                        left: v.version.clone(),
                        right: format!("{scheme} scheme"),
                    })
                })
        })
        .collect()
}

fn rebuilt_version(log: &[Event], event: Event, artifact: &ArtifactName, id: &str) -> Result<Version> {
    let mut events = log.to_vec();
    events.push(event);
    let state = StateBuilder::build(events)?;
    require_artifact(&state, artifact)?
        .version(id)
        .cloned()
        .ok_or_else(|| RegistryError::VersionRequired(format!("{artifact} {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagreg_refs::InMemoryRepository;
    use tagreg_types::timestamp_from_secs;

    use crate::event::tag_events;

    struct Fixture {
        repo: InMemoryRepository,
        settings: LedgerSettings,
    }

    impl Fixture {
        fn new(scheme: VersionScheme) -> Self {
            let repo = InMemoryRepository::new();
            repo.freeze_clock(timestamp_from_secs(1_700_000_000)).unwrap();
            Self {
                repo,
                settings: LedgerSettings {
                    scheme,
                    ..LedgerSettings::default()
                },
            }
        }

        fn commit(&self) -> String {
            self.repo.advance_clock(1).unwrap();
            self.repo.create_commit("work").unwrap().to_string()
        }

        fn log(&self) -> Vec<Event> {
            tag_events(&self.repo).unwrap()
        }

        fn manager(&self) -> VersionManager<'_, InMemoryRepository> {
            VersionManager::new(&self.repo, &self.settings)
        }

        fn register(&self, rev: &str, version: Option<&str>, bump: Option<BumpPart>) -> Result<Version> {
            self.manager().register(&self.log(), "rf", rev, version, bump)
        }
    }

    // ---- Test 1: conflict scenario ----

    #[test]
    fn duplicate_registration_conflicts() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();
        let c2 = fx.commit();

        let v = fx.register(&c1, Some("v1.2.3"), None).unwrap();
        assert_eq!(v.version, "v1.2.3");
        assert!(v.is_registered());
        assert_eq!(fx.repo.tag_names().unwrap(), vec!["rf@v1.2.3".to_string()]);

        for rev in [&c1, &c2] {
            let err = fx.register(rev, Some("v1.2.3"), None).unwrap_err();
            assert!(matches!(err, RegistryError::VersionAlreadyRegistered { .. }), "{err}");
        }

        let err = fx.register(&c1, Some("v1.3.0"), None).unwrap_err();
        assert!(matches!(err, RegistryError::VersionExistsForCommit { .. }), "{err}");
    }

    // ---- Test 2: version arithmetic ----

    #[test]
    fn first_version_is_minimal() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();
        assert_eq!(fx.register(&c1, None, None).unwrap().version, "v0.0.1");

        let fx = Fixture::new(VersionScheme::Numbered);
        let c1 = fx.commit();
        assert_eq!(fx.register(&c1, None, None).unwrap().version, "v1");
    }

    #[test]
    fn omitted_version_bumps_latest() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let (c1, c2, c3, c4) = (fx.commit(), fx.commit(), fx.commit(), fx.commit());

        fx.register(&c1, Some("v1.3.4"), None).unwrap();
        assert_eq!(fx.register(&c2, None, None).unwrap().version, "v1.3.5");
        assert_eq!(fx.register(&c3, None, Some(BumpPart::Minor)).unwrap().version, "v1.4.0");
        assert_eq!(fx.register(&c4, None, Some(BumpPart::Major)).unwrap().version, "v2.0.0");
    }

    #[test]
    fn numbered_scheme_rejects_minor_bump() {
        let fx = Fixture::new(VersionScheme::Numbered);
        let (c1, c2) = (fx.commit(), fx.commit());
        fx.register(&c1, None, None).unwrap();
        let err = fx.register(&c2, None, Some(BumpPart::Minor)).unwrap_err();
        assert!(matches!(err, RegistryError::Type(TypeError::UnsupportedBump { .. })));
        assert_eq!(fx.register(&c2, None, Some(BumpPart::Major)).unwrap().version, "v2");
    }

    #[test]
    fn invalid_arguments_are_rejected_before_writing() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();

        let err = fx.register(&c1, Some("v1.0.0"), Some(BumpPart::Major)).unwrap_err();
        assert!(matches!(err, RegistryError::WrongArgs(_)));

        let err = fx.register(&c1, Some("1.0"), None).unwrap_err();
        assert!(matches!(err, RegistryError::Type(TypeError::InvalidVersionFormat { .. })));

        let err = fx
            .manager()
            .register(&fx.log(), "Bad_Name", &c1, None, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Type(TypeError::InvalidName { .. })));

        let err = fx.register("no-such-rev", None, None).unwrap_err();
        assert!(matches!(err, RegistryError::Ref(_)));

        assert!(fx.repo.tag_names().unwrap().is_empty());
    }

    #[test]
    fn mixing_schemes_is_rejected() {
        let fx = Fixture::new(VersionScheme::Numbered);
        let (c1, c2) = (fx.commit(), fx.commit());
        fx.register(&c1, Some("v3"), None).unwrap();

        let semver = Fixture {
            repo: fx.repo,
            settings: LedgerSettings::default(),
        };
        let err = semver.register(&c2, Some("v1.0.0"), None).unwrap_err();
        assert!(matches!(err, RegistryError::Type(TypeError::IncomparableVersions { .. })));
    }

    // ---- Test 3: deregistration ----

    #[test]
    fn deregister_anchors_at_registering_commit() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();
        let _later = fx.commit();
        let v = fx.register(&c1, Some("v1.0.0"), None).unwrap();

        let manager = fx.manager();
        let deregistered = manager.deregister(&fx.log(), "rf", "v1.0.0").unwrap();
        assert!(!deregistered.is_registered());

        let tag = fx.repo.read_tag("rf@v1.0.0!#1").unwrap();
        assert_eq!(tag.target, v.commit);

        let err = manager.deregister(&fx.log(), "rf", "v1.0.0").unwrap_err();
        assert!(matches!(err, RegistryError::VersionRequired(_)));
        let err = manager.deregister(&fx.log(), "nn", "v1.0.0").unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactNotFound(_)));
    }

    #[test]
    fn deregistered_version_can_be_registered_again() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();
        fx.register(&c1, Some("v1.0.0"), None).unwrap();
        fx.repo.advance_clock(1).unwrap();
        fx.manager().deregister(&fx.log(), "rf", "v1.0.0").unwrap();
        fx.repo.advance_clock(1).unwrap();

        let again = fx.register(&c1, Some("v1.0.0"), None).unwrap();
        assert!(again.is_registered());
        assert_eq!(again.registrations.len(), 2);
        assert_eq!(again.registrations[1].ref_name, "rf@v1.0.0#2");
    }

    #[test]
    fn reregistering_at_another_commit_moves_the_version() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let (c1, c2) = (fx.commit(), fx.commit());
        fx.register(&c1, Some("v1.0.0"), None).unwrap();
        fx.repo.advance_clock(1).unwrap();
        fx.manager().deregister(&fx.log(), "rf", "v1.0.0").unwrap();
        fx.repo.advance_clock(1).unwrap();

        let again = fx.register(&c2, Some("v1.0.0"), None).unwrap();
        assert_eq!(again.commit.to_string(), c2);
        assert!(again.is_registered());
        assert_eq!(again.registrations.len(), 1);
        assert_eq!(again.registrations[0].ref_name, "rf@v1.0.0#2");

        // c2 now holds v1.0.0; c1 is free again.
        fx.repo.advance_clock(1).unwrap();
        let err = fx.register(&c2, Some("v3.0.0"), None).unwrap_err();
        assert!(matches!(err, RegistryError::VersionExistsForCommit { .. }), "{err}");
        let v2 = fx.register(&c1, Some("v2.0.0"), None).unwrap();
        assert_eq!(v2.commit.to_string(), c1);

        fx.repo.advance_clock(1).unwrap();
        let dropped = fx.manager().deregister(&fx.log(), "rf", "v1.0.0").unwrap();
        assert_eq!(dropped.commit.to_string(), c2);
        assert!(!dropped.is_registered());
        let tag = fx.repo.read_tag("rf@v1.0.0!#3").unwrap();
        assert_eq!(tag.target.to_string(), c2);
    }

    #[test]
    fn bumping_past_the_largest_number_fails_without_writing() {
        let fx = Fixture::new(VersionScheme::Numbered);
        let (c1, c2) = (fx.commit(), fx.commit());
        fx.register(&c1, Some("v18446744073709551615"), None).unwrap();

        let err = fx.register(&c2, None, None).unwrap_err();
        assert!(matches!(err, RegistryError::Type(TypeError::VersionOverflow { .. })), "{err}");
        assert_eq!(fx.repo.tag_names().unwrap().len(), 1);
    }

    #[test]
    fn simple_tags_write_version_tags_without_counters() {
        let mut fx = Fixture::new(VersionScheme::SemVer);
        fx.settings.simple_tags = true;
        let c1 = fx.commit();
        fx.register(&c1, Some("v1.0.0"), None).unwrap();
        fx.repo.advance_clock(1).unwrap();

        let dropped = fx.manager().deregister(&fx.log(), "rf", "v1.0.0").unwrap();
        assert_eq!(dropped.deregistrations[0].ref_name, "rf@v1.0.0!");
        assert_eq!(
            fx.repo.tag_names().unwrap(),
            vec!["rf@v1.0.0".to_string(), "rf@v1.0.0!".to_string()]
        );

        // Without a counter a second registration collides.
        fx.repo.advance_clock(1).unwrap();
        let err = fx.register(&c1, Some("v1.0.0"), None).unwrap_err();
        assert!(matches!(err, RegistryError::Ref(tagreg_refs::RefError::TagExists(_))), "{err}");

        let event = fx.manager().deprecate(&fx.log(), "rf").unwrap();
        assert_eq!(event.ref_name, "rf@deprecated");
    }

    // ---- Test 4: deprecation ----

    #[test]
    fn deprecate_once() {
        let fx = Fixture::new(VersionScheme::SemVer);
        let c1 = fx.commit();
        fx.register(&c1, Some("v1.0.0"), None).unwrap();

        let manager = fx.manager();
        let event = manager.deprecate(&fx.log(), "rf").unwrap();
        assert_eq!(event.ref_name, "rf@deprecated");
        assert_eq!(event.commit.to_string(), c1);

        let err = manager.deprecate(&fx.log(), "rf").unwrap_err();
        assert!(matches!(err, RegistryError::WrongArgs(_)));
        let err = manager.deprecate(&fx.log(), "nn").unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactNotFound(_)));
    }
}
