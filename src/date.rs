use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Formats a date the way the readings API expects it in `startdate`/`enddate`.
pub fn iso_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse date inputs:
/// - "YYYYMMDD", "YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS" / RFC 3339 (time part dropped)
/// - integer <= 0 means today + delta days
pub fn parse_date_like(s: &str, now: DateTime<Utc>) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        if n <= 0 {
            return Ok(now.date_naive() + Duration::days(n));
        }
        if trimmed.len() == 8 {
            return NaiveDate::parse_from_str(trimmed, "%Y%m%d")
                .map_err(|_| Error::InvalidQuery(format!("invalid YYYYMMDD date: {trimmed}")));
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(d);
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    Err(Error::InvalidQuery(format!(
        "unsupported date format: {trimmed}"
    )))
}

/// Parse an observation timestamp and normalize it to UTC.
///
/// Offsets are honoured; timestamps without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Whether every day up to `end` is already in the past, so upstream data
/// for the range is not expected to change any more.
pub fn is_historical(end: &NaiveDate, now: DateTime<Utc>) -> bool {
    *end < now.date_naive()
}
