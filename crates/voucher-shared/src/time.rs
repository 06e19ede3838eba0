//! Timestamp conventions.
//!
//! Every persisted timestamp is UTC, millisecond precision, `Z` suffix
//! (`2024-05-01T09:15:00.123Z`).  The fixed width keeps lexicographic and
//! chronological order identical, which the sliding-window and date-range
//! queries rely on.  The HMAC payload uses the same rendering.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Render a timestamp in the canonical storage / signing format.
pub fn to_iso_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop sub-millisecond precision so a value survives a store round trip
/// unchanged.
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}

/// Parse a canonical (or any RFC-3339) timestamp back to UTC.
pub fn parse_iso(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Calendar day of a timestamp.  Streaks use UTC days exclusively.
pub fn utc_day(ts: &DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}
