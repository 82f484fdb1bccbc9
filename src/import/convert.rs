//! Total field converters
//!
//! Numeric converters never fail: unparseable input becomes the type's
//! default. Dates are the natural key of a price row, so they report failure.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Exact date formats tried in order before the general fallbacks
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Date-time layouts accepted by the general fallback
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse a money/decimal value such as `$1,234.56`. Defaults to `0.0`.
pub fn parse_decimal(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse a percentage such as `-1.25%`. Defaults to `0.0`.
pub fn parse_percentage(raw: &str) -> f64 {
    let trimmed = raw.trim();
    parse_decimal(trimmed.strip_suffix('%').unwrap_or(trimmed))
}

/// Parse an integer count such as `12,345,678`. Defaults to `0`.
pub fn parse_long(raw: &str) -> i64 {
    parse_optional_long(raw).unwrap_or(0)
}

/// Parse an integer, or `None` when absent or unparseable
pub fn parse_optional_long(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<i64>().ok()
}

/// Parse a small optional integer such as an IPO year
pub fn parse_optional_int(raw: &str) -> Option<i32> {
    parse_optional_long(raw).and_then(|v| i32::try_from(v).ok())
}

/// Trimmed text, `None` when blank
pub fn parse_optional_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a date and normalize it to UTC.
///
/// Plain dates become midnight UTC. Offsets are converted to UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y/%m/%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
