//! Host repository access for tagreg.
//!
//! tagreg does not own a storage engine. Every registry event is an
//! annotated tag in the host git repository, and stage membership can
//! alternatively be read from branch ancestry. This crate is the boundary
//! to that repository.
//!
//! # Architecture
//!
//! - **Tags** are immutable. Creating one is atomic and fails with
//!   [`RefError::TagExists`] if the name is taken; this is the only
//!   concurrency control the registry relies on.
//! - **Branches** are read-only from tagreg's point of view.
//! - **Commits** are resolved from any revision string and walked through
//!   their parents.
//!
//! # Modules
//!
//! - [`error`]: Error types for repository operations
//! - [`types`]: [`TagRecord`], [`CommitInfo`], [`BranchHead`], [`NewTag`]
//! - [`traits`]: The [`Repository`] trait
//! - [`refname`]: git ref-name validation
//! - [`codec`]: Registry tag grammar: encode/decode
//! - [`memory`]: In-memory [`InMemoryRepository`] for tests and embedding
//! - [`git`]: [`GitRepository`] backed by the `git` binary

pub mod codec;
pub mod error;
pub mod git;
pub mod memory;
pub mod refname;
pub mod traits;
pub mod types;

pub use codec::{decode, encode, next_counter, NamingMode, TagAction, TagFields};
pub use error::{RefError, Result};
pub use git::GitRepository;
pub use memory::InMemoryRepository;
pub use refname::validate_tag_name;
pub use traits::Repository;
pub use types::{BranchHead, CommitInfo, NewTag, TagRecord};
