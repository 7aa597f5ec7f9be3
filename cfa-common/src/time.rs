//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 UTC strings with
//! microsecond precision (`2026-10-17T08:15:00.000000Z`), so lexical order in
//! SQLite matches chronological order.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp
pub fn parse_optional_db_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_db_timestamp).transpose()
}

/// Smallest timestamp that is both >= `now` and strictly after `previous`
///
/// Storage resolution is one microsecond, so two writes within the same
/// microsecond still get distinct, increasing stamps.
pub fn strictly_after(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_to_micros(now);
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}

fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros();
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}
