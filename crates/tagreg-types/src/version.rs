//! Version numbering schemes.
//!
//! A repository picks one [`VersionScheme`] in its configuration and every
//! version string of every artifact is parsed with it. Two schemes ship:
//!
//! - **Numbered**: `v1`, `v2`, ... Only the major part can be bumped.
//! - **SemVer**: `v1.2.3`, `v1.2.3-rc.1+build.5`. Precedence follows
//!   semantic versioning 2.0.0; build metadata is ignored when ordering.
//!
//! Values of different schemes never compare: [`VersionValue::compare`]
//! returns [`TypeError::IncomparableVersions`] instead.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// The numbering scheme configured for a repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    Numbered,
    #[default]
    SemVer,
}

impl VersionScheme {
    pub fn name(&self) -> &'static str {
        match self {
            VersionScheme::Numbered => "numbered",
            VersionScheme::SemVer => "semver",
        }
    }

    /// Parse a version string in this scheme.
    pub fn parse(&self, s: &str) -> Result<VersionValue> {
        let invalid = || TypeError::InvalidVersionFormat {
            value: s.to_string(),
            scheme: self.name(),
        };
        match self {
            VersionScheme::Numbered => NumberedVersion::parse(s)
                .map(VersionValue::Numbered)
                .ok_or_else(invalid),
            VersionScheme::SemVer => SemVersion::parse(s)
                .map(VersionValue::SemVer)
                .ok_or_else(invalid),
        }
    }

    /// Returns `true` if `s` parses in this scheme.
    pub fn is_valid(&self, s: &str) -> bool {
        self.parse(s).is_ok()
    }

    /// The first version an artifact receives when none is requested.
    pub fn minimal(&self) -> VersionValue {
        match self {
            VersionScheme::Numbered => VersionValue::Numbered(NumberedVersion(1)),
            VersionScheme::SemVer => VersionValue::SemVer(SemVersion::new(0, 0, 1)),
        }
    }

    /// The smallest part this scheme can bump.
    pub fn default_bump(&self) -> BumpPart {
        match self {
            VersionScheme::Numbered => BumpPart::Major,
            VersionScheme::SemVer => BumpPart::Patch,
        }
    }
}

impl fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VersionScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "numbered" => Ok(VersionScheme::Numbered),
            "semver" => Ok(VersionScheme::SemVer),
            other => Err(format!("unknown version scheme: {other}")),
        }
    }
}

/// The part of a version to increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpPart {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for BumpPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BumpPart::Major => "major",
            BumpPart::Minor => "minor",
            BumpPart::Patch => "patch",
        })
    }
}

impl FromStr for BumpPart {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(BumpPart::Major),
            "minor" => Ok(BumpPart::Minor),
            "patch" => Ok(BumpPart::Patch),
            other => Err(format!("unknown bump part: {other}")),
        }
    }
}

/// A parsed version in one of the supported schemes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VersionValue {
    Numbered(NumberedVersion),
    SemVer(SemVersion),
}

impl VersionValue {
    pub fn scheme(&self) -> VersionScheme {
        match self {
            VersionValue::Numbered(_) => VersionScheme::Numbered,
            VersionValue::SemVer(_) => VersionScheme::SemVer,
        }
    }

    /// Order two versions of the same scheme.
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        match (self, other) {
            (VersionValue::Numbered(a), VersionValue::Numbered(b)) => Ok(a.cmp(b)),
            (VersionValue::SemVer(a), VersionValue::SemVer(b)) => Ok(a.precedence(b)),
            _ => Err(TypeError::IncomparableVersions {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    /// Increment `part`, returning the new version.
    pub fn bump(&self, part: BumpPart) -> Result<Self> {
        let bumped = match self {
            VersionValue::Numbered(n) => match part {
                BumpPart::Major => n.0.checked_add(1).map(|n| VersionValue::Numbered(NumberedVersion(n))),
                other => {
                    return Err(TypeError::UnsupportedBump {
                        scheme: VersionScheme::Numbered.name(),
                        part: other.to_string(),
                    })
                }
            },
            VersionValue::SemVer(s) => s.bump(part).map(VersionValue::SemVer),
        };
        bumped.ok_or_else(|| TypeError::VersionOverflow {
            version: self.to_string(),
            part: part.to_string(),
        })
    }

    pub fn is_prerelease(&self) -> bool {
        match self {
            VersionValue::Numbered(_) => false,
            VersionValue::SemVer(s) => !s.pre.is_empty(),
        }
    }
}

impl fmt::Display for VersionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionValue::Numbered(n) => n.fmt(f),
            VersionValue::SemVer(s) => s.fmt(f),
        }
    }
}

/// `v` followed by an unsigned integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumberedVersion(pub u64);

impl NumberedVersion {
    fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('v')?;
        parse_numeric(digits).map(NumberedVersion)
    }
}

impl fmt::Display for NumberedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A pre-release identifier.
///
/// Numeric identifiers sort numerically and below alphanumeric ones, which
/// sort lexically in ASCII order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::Alpha(s) => f.write_str(s),
        }
    }
}

/// `v<major>.<minor>.<patch>[-prerelease][+build]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SemVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Vec<String>,
}

impl SemVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('v')?;
        let (rest, build) = match rest.split_once('+') {
            Some((head, build)) => (head, parse_build(build)?),
            None => (rest, Vec::new()),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((head, pre)) => (head, parse_prerelease(pre)?),
            None => (rest, Vec::new()),
        };

        let mut parts = core.split('.');
        let major = parse_numeric(parts.next()?)?;
        let minor = parse_numeric(parts.next()?)?;
        let patch = parse_numeric(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }

    /// Semantic-versioning precedence. Build metadata does not participate.
    pub fn precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }

    /// `None` if the bumped part does not fit in a `u64`.
    fn bump(&self, part: BumpPart) -> Option<Self> {
        Some(match part {
            BumpPart::Major => Self::new(self.major.checked_add(1)?, 0, 0),
            BumpPart::Minor => Self::new(self.major, self.minor.checked_add(1)?, 0),
            BumpPart::Patch => Self::new(self.major, self.minor, self.patch.checked_add(1)?),
        })
    }
}

impl fmt::Display for SemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            let pre: Vec<String> = self.pre.iter().map(ToString::to_string).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

/// Digits only, no leading zeros except a lone `0`.
fn parse_numeric(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn parse_prerelease(s: &str) -> Option<Vec<Identifier>> {
    s.split('.')
        .map(|part| {
            if !is_identifier(part) {
                None
            } else if part.bytes().all(|b| b.is_ascii_digit()) {
                parse_numeric(part).map(Identifier::Numeric)
            } else {
                Some(Identifier::Alpha(part.to_string()))
            }
        })
        .collect()
}

fn parse_build(s: &str) -> Option<Vec<String>> {
    s.split('.')
        .map(|part| is_identifier(part).then(|| part.to_string()))
        .collect()
}
