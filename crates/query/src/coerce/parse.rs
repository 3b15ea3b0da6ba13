//! Parsers for raw request values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Accepted date inputs, besides `today`.
pub const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%m", "%Y"];

/// Accepted datetime inputs, besides `today`, `now` and RFC 3339.
pub const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d",
    "%Y-%m",
    "%Y",
];

const TRUE_TOKENS: &[&str] = &["y", "yes", "t", "true", "on", "1"];
const FALSE_TOKENS: &[&str] = &["n", "no", "f", "false", "off", "0"];

/// Parses a boolean-like token, ignoring case and surrounding whitespace.
pub fn strtobool(raw: &str) -> Option<bool> {
    let token = raw.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parses a whole number. Decimal notation with a zero fraction is accepted.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let (whole, fraction) = raw.split_once('.')?;
    if !fraction.chars().all(|c| c == '0') || whole.is_empty() {
        return None;
    }
    whole.parse::<i64>().ok()
}

/// Parses a decimal number, plain or in scientific notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `YYYY-MM-DD`, `YYYY-MM` (first of the month) or `YYYY` (first
/// of the year).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('-').collect();
    match parts.as_slice() {
        [year, month, day] if all_digits(year, 4) => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
        }
        [year, month] if all_digits(year, 4) && !month.is_empty() && month.len() <= 2 => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
        [year] if all_digits(year, 4) => NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1),
        _ => None,
    }
}

/// Parses a datetime in any of the accepted formats.
///
/// Values carrying an offset are converted to UTC. Date-only values are
/// taken at midnight.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in &DATETIME_INPUT_FORMATS[..4] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc());
    }
    parse_date(raw).map(|date| date.and_time(NaiveTime::MIN))
}

/// Parses a timestamp the way free-text search does: ISO 8601 with or
/// without seconds or an offset first, then the partial date formats taken
/// at midnight.
pub fn parse_search_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc());
    }
    for format in &DATETIME_INPUT_FORMATS[..4] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    parse_date(raw).map(|date| date.and_time(NaiveTime::MIN))
}

/// Splits a comma-delimited list, trimming each item.
pub fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).collect()
}
