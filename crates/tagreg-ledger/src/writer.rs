use tagreg_refs::{encode, NamingMode, NewTag, RefError, Repository, TagAction};
use tagreg_types::{ArtifactName, CommitId};
use tracing::info;

use crate::error::Result;
use crate::event::Event;

/// Write one registry tag and return the event it records.
///
/// The counter is allocated from the tag names present right now. A
/// concurrent writer that allocated the same name makes this fail with
/// [`RefError::TagExists`].
pub(crate) fn append<R: Repository + ?Sized>(
    repo: &R,
    artifact: &ArtifactName,
    action: TagAction,
    naming: NamingMode,
    target: &CommitId,
    message: String,
) -> Result<Event> {
    let existing = repo.tag_names()?;
    let fields = encode(artifact, action, naming, &existing);
    let record = repo.create_tag(&NewTag::new(fields.to_string(), target.clone(), message))?;
    info!(tag = %record.name, commit = %record.target.short(), "wrote registry tag");

    Event::from_tag(&record).ok_or_else(|| {
        RefError::Parse(format!("written tag {} is not a registry tag", record.name)).into()
    })
}
