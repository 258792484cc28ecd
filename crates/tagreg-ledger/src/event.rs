//! Registry events and the total order they are replayed in.
//!
//! Events come from three places: registry tags in the host repository,
//! synthetic assignments inferred from branch ancestry, and synthetic
//! creations from the commit-is-a-version strategy. All three share the
//! [`Event`] record and the same ordering.
//!
//! # Ordering
//!
//! Tag timestamps have one-second resolution, so ties are common in
//! scripted setups. Events sort by:
//!
//! 1. timestamp
//! 2. [`EventKind::priority`]
//! 3. counter (absent counts as 0)
//! 4. reference name
//! 5. commit hash
//! 6. version or stage operand
//! 7. kind
//!
//! followed by the remaining fields, which makes the order total and
//! consistent with `Eq`.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagreg_refs::{decode, CommitInfo, Repository, TagAction, TagRecord};
use tagreg_types::{ArtifactName, CommitId, StageName};
use tracing::{debug, warn};

use crate::error::Result;

/// The kind of a registry event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Creation,
    Registration,
    Deregistration,
    Assignment,
    Unassignment,
    Deprecation,
}

impl EventKind {
    /// Tie-break priority for events sharing a timestamp. Lower sorts first.
    ///
    /// | kind           | priority |
    /// |----------------|----------|
    /// | creation       | 0        |
    /// | registration   | 3        |
    /// | deregistration | 3        |
    /// | assignment     | 5        |
    /// | unassignment   | 5        |
    /// | deprecation    | 7        |
    pub fn priority(self) -> u8 {
        match self {
            EventKind::Creation => 0,
            EventKind::Registration | EventKind::Deregistration => 3,
            EventKind::Assignment | EventKind::Unassignment => 5,
            EventKind::Deprecation => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Creation => "creation",
            EventKind::Registration => "registration",
            EventKind::Deregistration => "deregistration",
            EventKind::Assignment => "assignment",
            EventKind::Unassignment => "unassignment",
            EventKind::Deprecation => "deprecation",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the registry log.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub artifact: ArtifactName,
    /// Version identifier, for registration events and for synthetic
    /// assignments that know the version they bind.
    pub version: Option<String>,
    /// Stage, for assignment events.
    pub stage: Option<StageName>,
    pub counter: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub author_email: String,
    /// Commit the event is anchored at.
    pub commit: CommitId,
    pub message: String,
    /// Tag name, branch ref, or commit hash the event was read from.
    pub ref_name: String,
}

impl Event {
    /// Interpret a tag as a registry event. Returns `None` for tags outside
    /// the registry grammar.
    pub fn from_tag(tag: &TagRecord) -> Option<Event> {
        let fields = decode(&tag.name)?;
        let (kind, version, stage) = match fields.action {
            TagAction::Register(v) => (EventKind::Registration, Some(v), None),
            TagAction::Deregister(v) => (EventKind::Deregistration, Some(v), None),
            TagAction::Assign(s) => (EventKind::Assignment, None, Some(s)),
            TagAction::Unassign(s) => (EventKind::Unassignment, None, Some(s)),
            TagAction::Deprecate => (EventKind::Deprecation, None, None),
        };

        Some(Event {
            kind,
            artifact: fields.artifact,
            version,
            stage,
            counter: fields.counter,
            timestamp: tag.tagger.time,
            author: tag.tagger.name.clone(),
            author_email: tag.tagger.email.clone(),
            commit: tag.target.clone(),
            message: tag.message.clone(),
            ref_name: tag.name.clone(),
        })
    }

    /// A creation event for `artifact` found at `commit`, dated at commit
    /// time and keyed by the commit hash.
    pub fn creation(artifact: ArtifactName, commit: &CommitInfo) -> Event {
        Event {
            kind: EventKind::Creation,
            artifact,
            version: None,
            stage: None,
            counter: None,
            timestamp: commit.author.time,
            author: commit.author.name.clone(),
            author_email: commit.author.email.clone(),
            commit: commit.id.clone(),
            message: commit.message.clone(),
            ref_name: commit.id.to_string(),
        }
    }

    /// The version for registration events, the stage for assignment events.
    pub fn operand(&self) -> Option<&str> {
        match self.kind {
            EventKind::Assignment | EventKind::Unassignment => {
                self.stage.as_ref().map(StageName::as_str)
            }
            _ => self.version.as_deref(),
        }
    }

    /// Returns `true` if the event was read from a tag rather than
    /// inferred.
    pub fn is_tag(&self) -> bool {
        decode(&self.ref_name).is_some()
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.kind.priority().cmp(&other.kind.priority()))
            .then_with(|| self.counter.unwrap_or(0).cmp(&other.counter.unwrap_or(0)))
            .then_with(|| self.ref_name.cmp(&other.ref_name))
            .then_with(|| self.commit.cmp(&other.commit))
            .then_with(|| self.operand().cmp(&other.operand()))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.artifact.cmp(&other.artifact))
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.stage.cmp(&other.stage))
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.author.cmp(&other.author))
            .then_with(|| self.author_email.cmp(&other.author_email))
            .then_with(|| self.message.cmp(&other.message))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Read every registry event stored as a tag in `repo`, in log order.
///
/// Tags outside the grammar are skipped. Names that look like registry
/// tags but fail to decode are logged.
pub fn tag_events<R: Repository + ?Sized>(repo: &R) -> Result<Vec<Event>> {
    let tags = repo.tags()?;
    let mut events = Vec::with_capacity(tags.len());
    for tag in &tags {
        match Event::from_tag(tag) {
            Some(event) => events.push(event),
            None if tag.name.contains('@') || tag.name.contains('#') => {
                warn!(tag = %tag.name, "ignoring malformed registry tag");
            }
            None => {}
        }
    }
    events.sort();
    debug!(tags = tags.len(), events = events.len(), "collected tag events");
    Ok(events)
}
