use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// Hash of a commit in the host repository.
///
/// Stored as lowercase hex. Both SHA-1 (40 chars) and SHA-256 (64 chars)
/// object formats are accepted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Parse from a hex string. Uppercase input is normalised.
    pub fn from_hex(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let valid_len = normalized.len() == 40 || normalized.len() == 64;
        if !valid_len || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidCommit(s.to_string()));
        }
        Ok(Self(normalized))
    }

    /// Derive a SHA-1-sized commit id from arbitrary content.
    ///
    /// Used by repositories that mint their own commits (the in-memory
    /// backend). The id is the first 20 bytes of the BLAKE3 hash.
    pub fn digest(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(hex::encode(&hash.as_bytes()[..20]))
    }

    /// Full hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated hex representation (first 7 characters).
    pub fn short(&self) -> &str {
        &self.0[..7]
    }

    /// Returns `true` if `prefix` abbreviates this commit.
    pub fn starts_with(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> String {
        id.0
    }
}
