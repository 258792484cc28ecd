//! Event log and derived state for tagreg.
//!
//! This crate is the heart of tagreg. It provides:
//! - The [`Event`] record and its total replay order
//! - [`StateBuilder`], a pure fold from events to [`RegistryState`]
//! - [`VersionManager`] and [`StageManager`], the validate-then-append
//!   write path
//! - [`BranchManager`], which infers stages from branch ancestry
//! - [`LogDoctor`], a consistency check over every registry tag
//!
//! Managers take the current log as an argument and never cache state
//! between calls. The host repository's atomic tag creation is the only
//! concurrency control.

pub mod branches;
pub mod builder;
pub mod error;
pub mod event;
pub mod settings;
pub mod stages;
pub mod state;
pub mod validation;
pub mod versions;
mod writer;

pub use branches::BranchManager;
pub use builder::StateBuilder;
pub use error::{RegistryError, Result};
pub use event::{tag_events, Event, EventKind};
pub use settings::LedgerSettings;
pub use stages::{AssignRequest, StageChange, StageManager};
pub use state::{ActiveStage, Artifact, RegistryState, StageBinding, StageLimits, Version};
pub use validation::{DoctorReport, LogDoctor, Violation, ViolationKind};
pub use versions::VersionManager;
