//! Parsing of the timestamp spellings found in EXIF tags, KML, GPX and GeoJSON.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref OFFSET_RE: Regex = Regex::new(r"^([+-])(\d{2}):?(\d{2})$").unwrap();
}

const NAIVE_FORMATS: [&str; 3] = ["%Y:%m:%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses a naive EXIF datetime (`YYYY:MM:DD HH:MM:SS[.fff]`). Dashes and a `T` separator
/// are accepted too.
pub fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parses a datetime carrying its own offset, EXIF style or RFC 3339.
pub fn parse_datetime_offset(s: &str) -> Option<DateTime<FixedOffset>> {
    let formats = [
        "%Y:%m:%d %H:%M:%S%.f%:z",
        "%Y:%m:%d %H:%M:%S%:z",
        "%Y:%m:%d %H:%M:%S%z",
    ];
    formats
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok())
}

/// Parses a datetime ending in `Z`.
pub fn parse_datetime_utc_z(s: &str) -> Option<DateTime<Utc>> {
    let stripped = s.strip_suffix('Z')?;
    match parse_naive(stripped) {
        Some(naive) => Some(naive.and_utc()),
        None => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.to_utc()),
    }
}

/// Parses an offset like `+02:00`, `-0500` or `Z` into seconds east of UTC, keeping the
/// original spelling as the zone name.
pub fn parse_offset_string(offset_str: &str) -> Option<(i32, String)> {
    let seconds = match offset_str {
        "Z" => 0,
        _ => {
            let caps = OFFSET_RE.captures(offset_str)?;
            let (hours, minutes): (i32, i32) = (caps[2].parse().ok()?, caps[3].parse().ok()?);
            if hours > 14 || minutes > 59 {
                return None;
            }
            let magnitude = hours * 3600 + minutes * 60;
            if &caps[1] == "-" { -magnitude } else { magnitude }
        }
    };
    Some((seconds, offset_str.to_string()))
}

/// Reads a timestamp from a document field (`<when>`, `<time>`, `coordTimes`, `capturedAt`).
///
/// Offset-aware values are converted to UTC. Values without an offset are taken as UTC, and a
/// bare date means midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(dt) = parse_datetime_utc_z(s) {
        return Some(dt);
    }
    if let Some(dt) = parse_datetime_offset(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = parse_naive(s) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// ISO 8601 with milliseconds and a `Z` suffix.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
