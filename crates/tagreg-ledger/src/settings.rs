use serde::{Deserialize, Serialize};
use tagreg_refs::NamingMode;
use tagreg_types::{StageName, VersionScheme};

use crate::error::{RegistryError, Result};
use crate::state::StageLimits;

/// The repository settings the write path and queries consult.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub scheme: VersionScheme,
    /// Allowed stages. Empty allows any valid stage name.
    pub stages: Vec<StageName>,
    /// Write every tag without a counter suffix. A repeated action then
    /// collides with the earlier tag instead of continuing its family.
    pub simple_tags: bool,
    pub limits: StageLimits,
}

impl LedgerSettings {
    /// Naming mode for assignment and unassignment tags.
    pub fn stage_naming(&self) -> NamingMode {
        if self.simple_tags {
            NamingMode::Simple
        } else {
            NamingMode::Counted
        }
    }

    /// Naming mode for registration, deregistration and deprecation tags.
    ///
    /// Counted mode leaves the first tag of a family bare, so a version's
    /// first registration stays `name@version`.
    pub fn version_naming(&self) -> NamingMode {
        if self.simple_tags {
            NamingMode::Simple
        } else {
            NamingMode::Auto
        }
    }

    /// Reject stages outside the allow-list.
    pub fn check_stage(&self, stage: &StageName) -> Result<()> {
        if self.stages.is_empty() || self.stages.contains(stage) {
            return Ok(());
        }
        Err(RegistryError::UnknownStage {
            stage: stage.to_string(),
            allowed: self.stages.iter().map(ToString::to_string).collect(),
        })
    }
}
