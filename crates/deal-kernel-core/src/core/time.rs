// crates/deal-kernel-core/src/core/time.rs
// ============================================================================
// Module: Deal Kernel Time Model
// Description: Canonical millisecond-precision UTC timestamps.
// Purpose: Provide deterministic, replayable time values for events and logs.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The kernel serializes every timestamp as a fixed-width ISO-8601 UTC string
//! (`YYYY-MM-DDTHH:MM:SS.mmmZ`). The fixed subsecond width keeps canonical
//! hashes stable and makes stored text timestamps sort lexicographically.
//! Values are truncated to millisecond precision at construction so a parsed
//! round trip is byte-identical.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed-width serialization format with exactly three subsecond digits.
const CANONICAL_FORMAT: &[BorrowedFormatItem] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// Nanoseconds per millisecond, used for truncation.
const NANOS_PER_MILLI: i64 = 1_000_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or constructing timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// Input was not a valid ISO-8601 / RFC 3339 instant.
    #[error("invalid timestamp: {0}")]
    Invalid(String),
    /// Instant is outside the representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical kernel timestamp.
///
/// # Invariants
/// - Always UTC.
/// - Always truncated to millisecond precision.
/// - The wire form is the fixed-width `YYYY-MM-DDTHH:MM:SS.mmmZ` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock instant truncated to milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::truncate(OffsetDateTime::now_utc())
    }

    /// Builds a timestamp from unix epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] when the value cannot be
    /// represented.
    pub fn from_unix_millis(millis: i64) -> Result<Self, TimestampError> {
        let nanos = i128::from(millis) * i128::from(NANOS_PER_MILLI);
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .map_err(|err| TimestampError::OutOfRange(err.to_string()))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        let nanos = self.0.unix_timestamp_nanos() / i128::from(NANOS_PER_MILLI);
        i64::try_from(nanos).unwrap_or(i64::MAX)
    }

    /// Parses an ISO-8601 / RFC 3339 instant, truncating to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Invalid`] when the input does not parse.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimestampError::Invalid(err.to_string()))?;
        Ok(Self::truncate(parsed.to_offset(time::UtcOffset::UTC)))
    }

    /// Renders the canonical fixed-width string form.
    #[must_use]
    pub fn render(&self) -> String {
        self.0.format(CANONICAL_FORMAT).unwrap_or_else(|_| String::from("0000-00-00T00:00:00.000Z"))
    }

    /// Truncates an instant to millisecond precision in UTC.
    fn truncate(value: OffsetDateTime) -> Self {
        let millis = value.nanosecond() / 1_000_000;
        let truncated = value
            .replace_nanosecond(millis * 1_000_000)
            .unwrap_or(value)
            .to_offset(time::UtcOffset::UTC);
        Self(truncated)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
