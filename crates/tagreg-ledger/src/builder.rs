use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::event::{Event, EventKind};
use crate::state::{Artifact, RegistryState, StageBinding, Version};

/// Folds an event log into [`RegistryState`].
///
/// The input may be in any order; it is sorted by the [`Event`] total order
/// first, so the same multiset of events always produces the same state.
pub struct StateBuilder;

impl StateBuilder {
    pub fn build(events: impl IntoIterator<Item = Event>) -> Result<RegistryState> {
        let mut events: Vec<Event> = events.into_iter().collect();
        events.sort();

        let mut state = RegistryState::default();
        for event in events {
            Self::apply(&mut state, event)?;
        }
        debug!(artifacts = state.artifacts.len(), "built registry state");
        Ok(state)
    }

    fn apply(state: &mut RegistryState, event: Event) -> Result<()> {
        let artifact = state
            .artifacts
            .entry(event.artifact.clone())
            .or_insert_with(|| Artifact::new(event.artifact.clone()));

        match event.kind {
            EventKind::Registration => Self::register(artifact, event),
            EventKind::Deregistration => Self::deregister(artifact, event)?,
            EventKind::Assignment => Self::assign(artifact, event),
            EventKind::Unassignment => Self::unassign(artifact, event)?,
            EventKind::Deprecation => artifact.deprecations.push(event),
            EventKind::Creation => {
                Self::version_at_or_implicit(artifact, &event);
            }
        }
        Ok(())
    }

    fn register(artifact: &mut Artifact, event: Event) {
        let id = event.version.clone().unwrap_or_default();

        // Registering an identifier again at another commit starts a new
        // entry; the old one keeps its commit and history.
        if let Some(version) = artifact
            .versions
            .iter_mut()
            .find(|v| v.version == id && v.commit == event.commit)
        {
            version.registrations.push(event);
            return;
        }

        // An implicit version at this commit takes the registered name.
        if let Some(version) = artifact
            .versions
            .iter_mut()
            .find(|v| v.commit == event.commit && v.is_implicit())
        {
            version.version = id;
            version.registrations.push(event);
            return;
        }

        let mut version = Version::implicit(&event);
        version.version = id;
        version.registrations.push(event);
        artifact.versions.push(version);
    }

    fn deregister(artifact: &mut Artifact, event: Event) -> Result<()> {
        let id = event.version.as_deref().unwrap_or_default();
        let index = artifact
            .versions
            .iter()
            .position(|v| v.version == id && v.commit == event.commit)
            .or_else(|| artifact.version_index(id))
            .ok_or_else(|| {
                RegistryError::VersionRequired(format!(
                    "{} deregisters unknown version {id} of {}",
                    event.ref_name, event.artifact
                ))
            })?;
        artifact.versions[index].deregistrations.push(event);
        Ok(())
    }

    fn assign(artifact: &mut Artifact, event: Event) {
        let Some(stage) = event.stage.clone() else {
            return;
        };
        let version = Self::version_at_or_implicit(artifact, &event);
        version
            .stages
            .entry(stage.clone())
            .or_insert_with(|| StageBinding::new(stage))
            .assignments
            .push(event);
    }

    fn unassign(artifact: &mut Artifact, event: Event) -> Result<()> {
        let no_active = || RegistryError::NoActiveLabel {
            artifact: event.artifact.to_string(),
            stage: event
                .stage
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        };
        let stage = event.stage.clone().ok_or_else(no_active)?;

        // Close the most recently opened binding for this stage at the commit.
        let binding = artifact
            .versions
            .iter_mut()
            .filter(|v| v.commit == event.commit)
            .filter_map(|v| v.stages.get_mut(&stage))
            .filter(|b| b.is_active())
            .max_by(|a, b| a.assignments.last().cmp(&b.assignments.last()))
            .ok_or_else(no_active)?;
        binding.unassignments.push(event);
        Ok(())
    }

    fn version_at_or_implicit<'a>(artifact: &'a mut Artifact, event: &Event) -> &'a mut Version {
        let index = match artifact.version_index_at(&event.commit) {
            Some(index) => index,
            None => {
                artifact.versions.push(Version::implicit(event));
                artifact.versions.len() - 1
            }
        };
        &mut artifact.versions[index]
    }
}
