//! Repository configuration, read from `.tagreg.toml`.
//!
//! Every key is optional:
//!
//! ```toml
//! version_scheme = "semver"        # or "numbered"
//! stages = ["dev", "prod"]         # empty allows any stage
//! types = ["model", "dataset"]     # empty allows any type
//! simple_tags = false
//! stage_strategy = "tags"          # or "branches"
//! commit_is_a_version = false
//! versions_per_stage = 1           # 0 is unlimited
//! assignments_per_version = 0      # 0 is unlimited
//! ancestry_depth_limit = 500
//!
//! [branch_stages]
//! main = "staging"
//! release = "prod"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tagreg_ledger::{LedgerSettings, StageLimits};
use tagreg_types::{StageName, VersionScheme};

use crate::error::{SdkError, SdkResult};

/// File name of the configuration, relative to the repository root.
pub const CONFIG_FILE: &str = ".tagreg.toml";

/// Where stage membership comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStrategy {
    /// Assignment and unassignment tags.
    #[default]
    Tags,
    /// Branch ancestry, via `branch_stages`.
    Branches,
}

/// Per-repository registry configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub version_scheme: VersionScheme,
    pub stages: Vec<StageName>,
    pub types: Vec<String>,
    pub branch_stages: BTreeMap<String, StageName>,
    pub simple_tags: bool,
    pub stage_strategy: StageStrategy,
    pub commit_is_a_version: bool,
    pub assignments_per_version: Option<usize>,
    pub versions_per_stage: Option<usize>,
    pub ancestry_depth_limit: Option<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            version_scheme: VersionScheme::SemVer,
            stages: Vec::new(),
            types: Vec::new(),
            branch_stages: BTreeMap::new(),
            simple_tags: false,
            stage_strategy: StageStrategy::Tags,
            commit_is_a_version: false,
            assignments_per_version: None,
            versions_per_stage: Some(1),
            ancestry_depth_limit: None,
        }
    }
}

impl RegistryConfig {
    /// Load `.tagreg.toml` from `root`, or the defaults if there is none.
    pub fn load(root: &Path) -> SdkResult<Self> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> SdkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> SdkResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Check cross-key consistency.
    pub fn validate(&self) -> SdkResult<()> {
        if self.stage_strategy == StageStrategy::Branches && self.branch_stages.is_empty() {
            return Err(SdkError::Config(
                "stage_strategy = \"branches\" needs at least one entry in [branch_stages]".into(),
            ));
        }
        if !self.stages.is_empty() {
            if let Some(stage) = self
                .branch_stages
                .values()
                .find(|s| !self.stages.contains(s))
            {
                return Err(SdkError::Config(format!(
                    "branch_stages maps to {stage}, which is not in stages"
                )));
            }
        }
        Ok(())
    }

    /// Active-binding limits, with 0 meaning unlimited.
    pub fn limits(&self) -> StageLimits {
        let nonzero = |n: Option<usize>| n.filter(|&n| n > 0);
        StageLimits {
            assignments_per_version: nonzero(self.assignments_per_version),
            versions_per_stage: nonzero(self.versions_per_stage),
        }
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            scheme: self.version_scheme,
            stages: self.stages.clone(),
            simple_tags: self.simple_tags,
            limits: self.limits(),
        }
    }

    /// `true` if `kind` is an allowed artifact type.
    pub fn allows_type(&self, kind: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == kind)
    }
}
