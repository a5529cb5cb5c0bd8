// crates/trunkline-core/src/core/time.rs
// ============================================================================
// Module: Trunkline Time
// Description: Unix-millisecond timestamps and carrier timestamp parsing.
// Purpose: Provide one wire form for every recorded instant.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All recorded instants are unix milliseconds. The carrier reports times in
//! two shapes — integer milliseconds and RFC 3339 strings — and both parse
//! into the same [`Timestamp`] newtype. Wall-clock reads go through
//! [`Timestamp::now`] so tests can pin values explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// An instant in unix milliseconds.
///
/// # Invariants
/// - Serializes as a plain integer on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(1_000))
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }

    /// Returns unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns unix seconds (truncating).
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0.div_euclid(1_000)
    }

    /// Returns the whole-second difference `self - earlier`, clamped at zero.
    #[must_use]
    pub fn seconds_since(self, earlier: Self) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        u64::try_from(delta).unwrap_or(0).div_euclid(1_000)
    }

    /// Parses an RFC 3339 timestamp string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError`] when the string is not valid RFC 3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimeParseError> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimeParseError::new(value, &err.to_string()))?;
        let millis = parsed.unix_timestamp_nanos().div_euclid(1_000_000);
        let millis =
            i64::try_from(millis).map_err(|_| TimeParseError::new(value, "out of range"))?;
        Ok(Self(millis))
    }

    /// Parses a carrier-reported time: integer milliseconds or RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError`] when the value has neither shape.
    pub fn parse_carrier(value: &serde_json::Value) -> Result<Self, TimeParseError> {
        match value {
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::from_unix_millis)
                .ok_or_else(|| TimeParseError::new(&number.to_string(), "not an i64")),
            serde_json::Value::String(text) => Self::parse_rfc3339(text),
            other => Err(TimeParseError::new(&other.to_string(), "unsupported timestamp shape")),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parsing failure.
///
/// # Invariants
/// - `value` is truncated so malformed input cannot flood logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid timestamp {value:?}: {reason}")]
pub struct TimeParseError {
    /// Offending input (truncated).
    value: String,
    /// Parse failure reason.
    reason: String,
}

impl TimeParseError {
    /// Maximum length of the echoed input value.
    const MAX_ECHO_LENGTH: usize = 64;

    /// Creates a parse error with a truncated echo of the input.
    fn new(value: &str, reason: &str) -> Self {
        let mut value = value.to_string();
        value.truncate(Self::MAX_ECHO_LENGTH);
        Self {
            value,
            reason: reason.to_string(),
        }
    }
}
