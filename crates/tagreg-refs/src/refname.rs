//! Tag name validation following git's ref-name rules.
//!
//! Registry tags already satisfy these rules by construction; the check
//! guards the repository backends against arbitrary callers.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`,
//!   `*`, `[` or `\`
//! - Must not contain `..` or `@{`, and must not be exactly `@`
//! - Must not start or end with `/`, or end with `.` or `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, Result};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a short tag name, returning `Ok(())` if git would accept it.
///
/// ```
/// use tagreg_refs::refname::validate_tag_name;
///
/// assert!(validate_tag_name("rf@v1.2.3").is_ok());
/// assert!(validate_tag_name("rf#prod!#2").is_ok());
/// assert!(validate_tag_name("bad..name").is_err());
/// ```
pub fn validate_tag_name(name: &str) -> Result<()> {
    let reject = |reason: &str| -> Result<()> {
        Err(RefError::InvalidRefName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("name must not be empty");
    }
    if name == "@" {
        return reject("name must not be '@'");
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return reject(&format!("contains forbidden character: {ch:?}"));
    }
    if name.contains("..") {
        return reject("must not contain '..'");
    }
    if name.contains("@{") {
        return reject("must not contain '@{'");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return reject("must not start or end with '/'");
    }
    if name.ends_with('.') {
        return reject("must not end with '.'");
    }
    if name.ends_with(".lock") {
        return reject("must not end with '.lock'");
    }
    for component in name.split('/') {
        if component.is_empty() {
            return reject("path components must not be empty");
        }
        if component.starts_with('.') {
            return reject("components must not start with '.'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tags_are_valid_ref_names() {
        for name in [
            "rf@v1.2.3",
            "rf@v1.2.3!",
            "rf@v1.2.3-rc.1+build.7#3",
            "team/model#production",
            "team/model#production!#12",
            "nn@deprecated",
        ] {
            assert!(validate_tag_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_git_forbidden_names() {
        for name in [
            "", "@", "a b", "a\tb", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b", "a..b",
            "ref@{0}", "/lead", "trail/", "end.", "x.lock", "a//b", "a/.hidden",
        ] {
            assert!(validate_tag_name(name).is_err(), "{name:?}");
        }
    }
}
