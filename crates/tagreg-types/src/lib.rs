//! Foundation types for tagreg.
//!
//! tagreg keeps an artifact registry (versions, stage assignments,
//! deprecations) as annotated tags inside an ordinary git repository. This
//! crate holds the value types every other tagreg crate shares.
//!
//! # Key Types
//!
//! - [`ArtifactName`] / [`StageName`]: Validated registry names
//! - [`VersionScheme`] / [`VersionValue`]: Pluggable version numbering
//! - [`CommitId`]: Hex commit hash of the host repository
//! - [`Signature`]: Author identity plus a one-second-resolution timestamp

pub mod commit;
pub mod error;
pub mod name;
pub mod signature;
pub mod version;

pub use commit::CommitId;
pub use error::{Result, TypeError};
pub use name::{is_valid_name, ArtifactName, StageName, NAME_PATTERN};
pub use signature::{timestamp_from_secs, truncate_to_seconds, Signature};
pub use version::{
    BumpPart, Identifier, NumberedVersion, SemVersion, VersionScheme, VersionValue,
};
