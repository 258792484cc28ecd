use std::collections::HashMap;

use serde::Serialize;
use tagreg_refs::{decode, Repository};
use tagreg_types::{is_valid_name, VersionScheme};
use tracing::debug;

use crate::builder::StateBuilder;
use crate::error::Result;
use crate::event::Event;

/// Result of examining a repository's registry tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub tags_scanned: usize,
    pub events: usize,
    pub violations: Vec<Violation>,
}

impl DoctorReport {
    /// Returns `true` if no check failed.
    pub fn is_healthy(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific problem found in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The offending tag, if the problem is tied to one.
    pub ref_name: Option<String>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MalformedTag,
    InvalidVersion,
    LightweightTag,
    DuplicateCommit,
    InconsistentLog,
}

/// Registry log checker, in the spirit of `git fsck`.
pub struct LogDoctor;

impl LogDoctor {
    /// Scan every tag of `repo` and report problems without failing on
    /// them.
    pub fn examine<R: Repository + ?Sized>(repo: &R, scheme: VersionScheme) -> Result<DoctorReport> {
        let tags = repo.tags()?;
        let mut violations = Vec::new();
        let mut events = Vec::new();

        for tag in &tags {
            let Some(event) = Event::from_tag(tag) else {
                if looks_like_registry_tag(&tag.name) {
                    violations.push(Violation {
                        ref_name: Some(tag.name.clone()),
                        kind: ViolationKind::MalformedTag,
                        description: "does not match the registry tag grammar".into(),
                    });
                }
                continue;
            };

            if let Some(version) = &event.version {
                if !scheme.is_valid(version) {
                    violations.push(Violation {
                        ref_name: Some(tag.name.clone()),
                        kind: ViolationKind::InvalidVersion,
                        description: format!("{version} is not a valid {scheme} version"),
                    });
                }
            }
            if !tag.annotated {
                violations.push(Violation {
                    ref_name: Some(tag.name.clone()),
                    kind: ViolationKind::LightweightTag,
                    description: "lightweight tag; author and time come from the commit".into(),
                });
            }
            events.push(event);
        }

        let event_count = events.len();
        match StateBuilder::build(events) {
            Ok(state) => {
                for artifact in state.artifacts.values() {
                    let mut by_commit: HashMap<_, Vec<&str>> = HashMap::new();
                    for version in artifact.registered_versions() {
                        by_commit
                            .entry(&version.commit)
                            .or_default()
                            .push(version.version.as_str());
                    }
                    let mut duplicates: Vec<_> = by_commit
                        .into_iter()
                        .filter(|(_, versions)| versions.len() > 1)
                        .collect();
                    duplicates.sort();
                    for (commit, versions) in duplicates {
                        violations.push(Violation {
                            ref_name: None,
                            kind: ViolationKind::DuplicateCommit,
                            description: format!(
                                "artifact {} has {} registered at commit {}",
                                artifact.name,
                                versions.join(", "),
                                commit.short()
                            ),
                        });
                    }
                }
            }
            Err(err) => violations.push(Violation {
                ref_name: None,
                kind: ViolationKind::InconsistentLog,
                description: err.to_string(),
            }),
        }

        debug!(tags = tags.len(), violations = violations.len(), "examined registry log");
        Ok(DoctorReport {
            tags_scanned: tags.len(),
            events: event_count,
            violations,
        })
    }
}

/// A name that starts like a registry artifact and uses a registry
/// separator, but may fail the full grammar.
fn looks_like_registry_tag(name: &str) -> bool {
    name.split(['@', '#'])
        .next()
        .is_some_and(|head| head.len() < name.len() && is_valid_name(head))
}
