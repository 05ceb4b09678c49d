//! Column conversions shared by table modules.
//!
//! Timestamps are stored as Unix milliseconds in `INTEGER` columns; calendar
//! dates as `YYYY-MM-DD` text.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Unix milliseconds for `at`.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert a stored millisecond value back into a timestamp.
pub fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

/// Text form of an optional date column.
pub fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

/// Parse an optional date column. Empty text reads as `None`.
pub fn parse_date(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}
