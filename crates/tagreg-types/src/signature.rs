use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a tag or commit, and when.
///
/// Timestamps carry one-second resolution, matching what git records for
/// tags and commits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time: truncate_to_seconds(time),
        }
    }

    /// The same identity at a different point in time.
    pub fn at(&self, time: DateTime<Utc>) -> Self {
        Self::new(self.name.clone(), self.email.clone(), time)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Drop sub-second precision.
pub fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Build a UTC timestamp from UNIX seconds, clamping out-of-range values to
/// the epoch.
pub fn timestamp_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
