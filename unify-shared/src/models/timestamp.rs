//! Wire timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// UTC instant as carried on the wire (`createdAt`, `lastMessageAt`).
///
/// Serialized as an RFC 3339 string, which accepts the ISO-8601 form
/// produced by the server (`2024-05-01T12:00:00.000Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Absolute distance between two instants.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Duration {
        (self.0 - other.0).abs()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_javascript_iso_strings() {
        let ts: Timestamp = serde_json::from_str("\"2024-05-01T12:00:00.000Z\"").unwrap();
        assert_eq!(ts.0, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        let b = Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 3).unwrap());

        assert_eq!(a.distance(&b), Duration::seconds(3));
        assert_eq!(b.distance(&a), Duration::seconds(3));
    }
}
