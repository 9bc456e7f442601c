//! Run identifiers.
//!
//! Every pipeline invocation is keyed by a run identifier of the fixed shape
//! `YYYYMMDD-HHMMSS-hhhhhhhh`: a UTC creation timestamp followed by an
//! 8-character lowercase hex suffix. The identifier is minted once at job
//! submission time and then used as a storage path component.
//!
//! Because the timestamp portion is fixed-width, plain string ordering is
//! chronological ordering. The suffix only breaks ties between identifiers
//! minted in the same second, and that tie-break carries no meaning.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Total length of a run identifier
pub const RUN_ID_LEN: usize = 24;

/// Length of the `YYYYMMDD-HHMMSS` timestamp head
const TIMESTAMP_LEN: usize = 15;

/// Why a string is not a usable run identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The string does not have the `YYYYMMDD-HHMMSS-hhhhhhhh` shape
    #[error("not a run identifier: {0:?}")]
    Pattern(String),

    /// The shape matches but the date or time fields are out of range
    #[error("run identifier has an impossible timestamp: {0}")]
    Calendar(String),
}

/// A validated run identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Validate `s` against the fixed run identifier shape.
    ///
    /// Only the shape is checked here. A string such as
    /// `20251301-000000-deadbeef` parses, but its [`timestamp`](Self::timestamp)
    /// is `None`.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        if is_run_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(IdentifierError::Pattern(s.to_string()))
        }
    }

    /// Creation time encoded in the identifier, if it is a real calendar date.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.checked_timestamp().ok()
    }

    /// Like [`timestamp`](Self::timestamp) but reports why the date is invalid.
    pub fn checked_timestamp(&self) -> Result<DateTime<Utc>, IdentifierError> {
        let head = &self.0[..TIMESTAMP_LEN];
        NaiveDateTime::parse_from_str(head, "%Y%m%d-%H%M%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| IdentifierError::Calendar(self.0.clone()))
    }

    /// The 8-character hex suffix
    pub fn suffix(&self) -> &str {
        &self.0[TIMESTAMP_LEN + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Check the `^\d{8}-\d{6}-[a-f0-9]{8}$` shape without allocating.
pub fn is_run_id(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != RUN_ID_LEN {
        return false;
    }

    bytes.iter().enumerate().all(|(i, &b)| match i {
        0..=7 | 9..=14 => b.is_ascii_digit(),
        8 | 15 => b == b'-',
        _ => b.is_ascii_digit() || (b'a'..=b'f').contains(&b),
    })
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = IdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_run_id(&s) {
            Ok(Self(s))
        } else {
            Err(IdentifierError::Pattern(s))
        }
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_valid() {
        let id = RunId::parse("20250601-120000-abc12345").unwrap();
        assert_eq!(id.as_str(), "20250601-120000-abc12345");
        assert_eq!(id.suffix(), "abc12345");
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        for bad in [
            "",
            "20250601-120000-abc1234",
            "20250601-120000-abc123456",
            "20250601-120000-ABC12345",
            "20250601_120000-abc12345",
            "2025060a-120000-abc12345",
            "20250601-120000-abc1234g",
            "outputs",
            "20250601-120000-abc12345/",
        ] {
            assert!(
                matches!(RunId::parse(bad), Err(IdentifierError::Pattern(_))),
                "expected pattern failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_timestamp_matches_direct_parse() {
        let id = RunId::parse("20250603-140509-bbbbbbbb").unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 6, 3, 14, 5, 9).unwrap();
        assert_eq!(id.timestamp(), Some(expected));
    }

    #[test]
    fn test_calendar_failure_is_distinct_from_pattern_failure() {
        // Shape is fine, month 13 is not
        let id = RunId::parse("20251301-120000-abc12345").unwrap();
        assert_eq!(id.timestamp(), None);
        assert!(matches!(
            id.checked_timestamp(),
            Err(IdentifierError::Calendar(_))
        ));

        let id = RunId::parse("20250601-256000-abc12345").unwrap();
        assert_eq!(id.timestamp(), None);
    }

    #[test]
    fn test_ordering_is_chronological() {
        let mut ids = vec![
            RunId::parse("20250603-140000-bbbbbbbb").unwrap(),
            RunId::parse("20241231-235959-ffffffff").unwrap(),
            RunId::parse("20250601-120000-aaaaaaaa").unwrap(),
        ];
        ids.sort();

        let stamps: Vec<_> = ids.iter().map(|id| id.timestamp().unwrap()).collect();
        let mut sorted_stamps = stamps.clone();
        sorted_stamps.sort();
        assert_eq!(stamps, sorted_stamps);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let ok: RunId = serde_json::from_str("\"20250601-120000-abc12345\"").unwrap();
        assert_eq!(ok.as_str(), "20250601-120000-abc12345");

        let bad: Result<RunId, _> = serde_json::from_str("\"latest\"");
        assert!(bad.is_err());
    }
}
