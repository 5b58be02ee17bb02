//! Timestamp coercion for values found inside record bodies.

use crate::models::AnyValue;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

/// Integer timestamps up to this value are seconds; larger ones are milliseconds.
const MAX_UNIX_SECONDS: u64 = 100_000_000_000;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

/// ISO 8601 with a numeric offset, e.g. `2021-06-16T13:32:00.123-0500`.
const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Date and time followed by a zone abbreviation, e.g. `2021-06-16 13:32:00.21 EST`.
const ZONED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Zone abbreviations accepted after `ZONED_FORMAT`, with their UTC offsets in hours.
const ZONE_OFFSETS: [(&str, i32); 11] = [
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -5),
    ("EDT", -4),
    ("CST", -6),
    ("CDT", -5),
    ("MST", -7),
    ("MDT", -6),
    ("PST", -8),
    ("PDT", -7),
];

/// Converts a Unix timestamp to nanoseconds.
///
/// Values up to 100 billion are read as seconds, larger values as
/// milliseconds. Negative values and results that overflow `u64` yield `None`.
///
/// # Example
///
/// ```
/// use ingest::convert::timestamp::unix_to_nanos;
///
/// assert_eq!(unix_to_nanos(1_000), Some(1_000_000_000_000));
/// assert_eq!(unix_to_nanos(1_000_000_000_000), Some(1_000_000_000_000_000_000));
/// assert_eq!(unix_to_nanos(-1), None);
/// ```
#[must_use]
pub fn unix_to_nanos(timestamp: i64) -> Option<u64> {
    let timestamp = u64::try_from(timestamp).ok()?;
    if timestamp <= MAX_UNIX_SECONDS {
        timestamp.checked_mul(NANOS_PER_SECOND)
    } else {
        timestamp.checked_mul(NANOS_PER_MILLI)
    }
}

/// Attempts to read a value as a timestamp, returning nanoseconds since the epoch.
#[must_use]
pub fn coerce_to_timestamp(value: &AnyValue) -> Option<u64> {
    match value {
        AnyValue::Int(i) => unix_to_nanos(*i),
        AnyValue::Double(d) => double_to_nanos(*d),
        AnyValue::String(s) => parse_timestamp(s),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn double_to_nanos(value: f64) -> Option<u64> {
    if !value.is_finite() || value < 0.0 || value > i64::MAX as f64 {
        return None;
    }
    unix_to_nanos(value.trunc() as i64)
}

fn parse_timestamp(s: &str) -> Option<u64> {
    let s = s.trim();

    let parsed = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, ISO8601_FORMAT))
        .ok()
        .or_else(|| parse_zoned(s))?;

    parsed
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
}

fn parse_zoned(s: &str) -> Option<DateTime<FixedOffset>> {
    let (datetime, zone) = s.rsplit_once(' ')?;
    let hours = ZONE_OFFSETS
        .iter()
        .find(|(name, _)| *name == zone)
        .map(|(_, hours)| *hours)?;

    let naive = NaiveDateTime::parse_from_str(datetime, ZONED_FORMAT).ok()?;
    FixedOffset::east_opt(hours * 3600)?
        .from_local_datetime(&naive)
        .single()
}
