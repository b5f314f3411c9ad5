//! # Temporal Types — UTC-Only Timestamps
//!
//! `Timestamp` is a UTC instant truncated to millisecond precision. It
//! renders as `YYYY-MM-DDTHH:MM:SS.mmmZ`, which keeps the canonical bytes of
//! an `IdentityRecord` identical across nodes.
//!
//! Millisecond precision is needed because registration order decides which
//! record is current (newest `registeredAt` wins) and challenge timestamps
//! bound the validity window.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A UTC-only timestamp, truncated to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to milliseconds.
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-millisecond components.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        let millis = dt.timestamp_millis();
        Self(DateTime::from_timestamp_millis(millis).unwrap_or(dt))
    }

    /// Parse an RFC 3339 timestamp. Only the `Z` suffix is accepted.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::Timestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| ValidationError::Timestamp(format!("{s:?}: {e}")))?;
        Ok(Self::from_utc(dt.with_timezone(&Utc)))
    }

    /// From Unix epoch milliseconds.
    pub fn from_epoch_millis(millis: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| ValidationError::Timestamp(format!("out of range: {millis}")))
    }

    /// Unix epoch milliseconds.
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// This instant shifted forward by `d`. Saturates instead of overflowing.
    pub fn plus(&self, d: std::time::Duration) -> Self {
        let delta = Duration::from_std(d).unwrap_or(Duration::MAX);
        Self(self.0.checked_add_signed(delta).unwrap_or(self.0))
    }

    /// This instant shifted back by `d`. Saturates instead of overflowing.
    pub fn minus(&self, d: std::time::Duration) -> Self {
        let delta = Duration::from_std(d).unwrap_or(Duration::MAX);
        Self(self.0.checked_sub_signed(delta).unwrap_or(self.0))
    }

    /// Time elapsed from `self` until `later`; zero if `later` is earlier.
    pub fn elapsed_until(&self, later: Timestamp) -> std::time::Duration {
        (later.0 - self.0).to_std().unwrap_or_default()
    }

    /// Render as ISO8601 with millisecond precision and `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_from_utc_truncates_to_millis() {
        let dt = Utc
            .with_ymd_and_hms(2026, 1, 15, 12, 30, 45)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let ts = Timestamp::from_utc(dt);
        assert_eq!(ts.as_datetime().nanosecond(), 123_000_000);
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45.123Z");
    }

    #[test]
    fn test_parse_rejects_offsets() {
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-01-15T17:00:00+05:00").is_err());
        assert!(Timestamp::parse("not-a-date").is_err());
    }

    #[test]
    fn test_parse_accepts_whole_seconds() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00.000Z");
    }

    #[test]
    fn test_epoch_millis_roundtrip() {
        let ts = Timestamp::parse("2026-03-01T08:15:30.250Z").unwrap();
        assert_eq!(Timestamp::from_epoch_millis(ts.epoch_millis()).unwrap(), ts);
    }

    #[test]
    fn test_plus_minus_and_elapsed() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let later = ts.plus(std::time::Duration::from_secs(90));
        assert_eq!(ts.elapsed_until(later), std::time::Duration::from_secs(90));
        assert_eq!(later.elapsed_until(ts), std::time::Duration::ZERO);
        assert_eq!(later.minus(std::time::Duration::from_secs(90)), ts);
    }

    #[test]
    fn test_serde_uses_iso_string() {
        let ts = Timestamp::parse("2026-01-15T12:00:00.007Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-01-15T12:00:00.007Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
