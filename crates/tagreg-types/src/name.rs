//! Artifact and stage name validation.
//!
//! Registry names are embedded verbatim in tag names, so they follow a
//! deliberately narrow grammar:
//!
//! - First character is a lowercase ASCII letter
//! - Middle characters are lowercase letters, digits, `-` or `/`
//! - Last character is a lowercase letter or digit
//! - At least two characters long
//! - No two `/` in a row, since git refuses empty path components
//!
//! The grammar never admits `@`, `#` or `!`, which the tag codec uses as
//! separators.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// Unanchored name grammar, shared with the tag codec.
pub const NAME_PATTERN: &str = r"[a-z][a-z0-9\-/]*[a-z0-9]";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{NAME_PATTERN}$")).expect("name grammar compiles"));

/// Returns `true` if `name` is a valid artifact or stage name.
///
/// ```
/// use tagreg_types::is_valid_name;
///
/// assert!(is_valid_name("namespace/model"));
/// assert!(!is_valid_name("a_model"));
/// ```
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name) && !name.contains("//")
}

macro_rules! registry_name {
    ($(#[$meta:meta])* $ty:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $ty(String);

        impl $ty {
            /// Validate and wrap a name.
            pub fn new(name: impl Into<String>) -> Result<Self> {
                let name = name.into();
                if is_valid_name(&name) {
                    Ok(Self(name))
                } else {
                    Err(TypeError::InvalidName { kind: $kind, name })
                }
            }

            /// The name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.0)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(name: $ty) -> String {
                name.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

registry_name!(
    /// Name of a registered artifact (e.g. `"churn-model"`, `"team/nn"`).
    ArtifactName,
    "artifact"
);

registry_name!(
    /// Name of a deployment stage (e.g. `"staging"`, `"production"`).
    StageName,
    "stage"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(is_valid_name("model-prod"));
        assert!(is_valid_name("nn"));
        assert!(is_valid_name("namespace/model"));
        assert!(is_valid_name("rf2"));
    }

    #[test]
    fn invalid_names() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1nn"));
        assert!(!is_valid_name("a_model"));
        assert!(!is_valid_name("-model"));
        assert!(!is_valid_name("model-"));
        assert!(!is_valid_name("Model"));
        assert!(!is_valid_name("rf@v1"));
        assert!(!is_valid_name("rf#prod"));
        assert!(!is_valid_name("a"));
        assert!(!is_valid_name("namespace//model"));
        assert!(!is_valid_name("a//b"));
    }

    #[test]
    fn artifact_name_rejects_with_kind() {
        let err = ArtifactName::new("a_model").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidName {
                kind: "artifact",
                name: "a_model".into()
            }
        );
    }

    #[test]
    fn stage_name_parses() {
        let stage: StageName = "production".parse().unwrap();
        assert_eq!(stage.as_str(), "production");
        assert_eq!(stage.to_string(), "production");
    }

    #[test]
    fn serde_rejects_invalid_names() {
        let ok: ArtifactName = serde_json::from_str("\"nn\"").unwrap();
        assert_eq!(ok.as_str(), "nn");
        assert!(serde_json::from_str::<ArtifactName>("\"-nn\"").is_err());
    }
}
