//! Picks the most trustworthy capture time out of a photo's metadata tags.

use super::parsing::{parse_datetime_offset, parse_datetime_utc_z, parse_naive, parse_offset_string};
use super::structs::{CaptureTime, Confidence, TimeZoneInfo};
use crate::metadata::tag_str;
use crate::model::LatLng;
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::str::FromStr;
use std::sync::LazyLock;
use tzf_rs::DefaultFinder;

static FINDER: LazyLock<DefaultFinder> = LazyLock::new(DefaultFinder::new);

const LOCAL_TIME_TAGS: [&str; 5] = [
    "SubSecDateTimeOriginal",
    "DateTimeOriginal",
    "SubSecCreateDate",
    "CreateDate",
    "DateTimeDigitized",
];

const OFFSET_TAGS: [&str; 3] = ["OffsetTimeOriginal", "OffsetTimeDigitized", "OffsetTime"];

/// Resolves the capture time from an extractor tag mapping.
///
/// Priority, highest first:
/// 1. a time tag that already carries an offset or `Z`
/// 2. local time placed in the IANA zone found at the photo's GPS position
/// 3. local time plus an `OffsetTime*` tag
/// 4. the GPS clock (`GPSDateTime`, or `GPSDateStamp` + `GPSTimeStamp`)
/// 5. local time read as UTC
pub fn resolve_capture_time(tags: &Value, position: Option<LatLng>) -> Option<CaptureTime> {
    let mut best_local: Option<(NaiveDateTime, &str)> = None;

    for field in LOCAL_TIME_TAGS {
        let Some(raw) = tag_str(tags, &[field]) else {
            continue;
        };
        if let Some(utc) = parse_datetime_utc_z(raw) {
            return Some(aware_time(utc.fixed_offset(), "Z", field));
        }
        if let Some(dt) = parse_datetime_offset(raw) {
            let name = dt.offset().to_string();
            return Some(aware_time(dt, &name, field));
        }
        if best_local.is_none()
            && let Some(dt) = parse_naive(raw)
        {
            best_local = Some((dt, field));
        }
    }

    if let Some((local, source)) = best_local {
        if let Some(position) = position
            && let Some(resolved) = zone_from_position(local, source, position)
        {
            return Some(resolved);
        }
        if let Some(resolved) = zone_from_offset_tag(tags, local, source) {
            return Some(resolved);
        }
    }

    if let Some((utc, source)) = gps_clock(tags) {
        return Some(CaptureTime {
            utc,
            local: best_local.map_or_else(|| utc.naive_utc(), |(local, _)| local),
            timezone: Some(TimeZoneInfo {
                name: "UTC".to_string(),
                offset_seconds: 0,
                source: source.to_string(),
            }),
            source: source.to_string(),
            confidence: Confidence::Medium,
        });
    }

    best_local.map(|(local, source)| CaptureTime {
        utc: local.and_utc(),
        local,
        timezone: None,
        source: source.to_string(),
        confidence: Confidence::Low,
    })
}

fn aware_time(dt: DateTime<FixedOffset>, zone_name: &str, source: &str) -> CaptureTime {
    CaptureTime {
        utc: dt.with_timezone(&Utc),
        local: dt.naive_local(),
        timezone: Some(TimeZoneInfo {
            name: zone_name.to_string(),
            offset_seconds: dt.offset().local_minus_utc(),
            source: source.to_string(),
        }),
        source: source.to_string(),
        confidence: Confidence::High,
    }
}

fn zone_from_position(local: NaiveDateTime, source: &str, position: LatLng) -> Option<CaptureTime> {
    let tz = Tz::from_str(FINDER.get_tz_name(position.lng(), position.lat())).ok()?;
    let (LocalResult::Single(zoned) | LocalResult::Ambiguous(zoned, _)) =
        tz.from_local_datetime(&local)
    else {
        return None;
    };
    Some(CaptureTime {
        utc: zoned.with_timezone(&Utc),
        local,
        timezone: Some(TimeZoneInfo {
            name: tz.name().to_string(),
            offset_seconds: zoned.offset().fix().local_minus_utc(),
            source: "IANA from GPS".to_string(),
        }),
        source: source.to_string(),
        confidence: Confidence::High,
    })
}

fn zone_from_offset_tag(tags: &Value, local: NaiveDateTime, source: &str) -> Option<CaptureTime> {
    let (field, (offset_secs, offset_str)) = OFFSET_TAGS.iter().find_map(|&field| {
        tag_str(tags, &[field])
            .and_then(parse_offset_string)
            .map(|parsed| (field, parsed))
    })?;
    let offset = FixedOffset::east_opt(offset_secs)?;
    let dt = offset.from_local_datetime(&local).single()?;
    Some(CaptureTime {
        utc: dt.with_timezone(&Utc),
        local,
        timezone: Some(TimeZoneInfo {
            name: offset_str,
            offset_seconds: offset_secs,
            source: field.to_string(),
        }),
        source: source.to_string(),
        confidence: Confidence::High,
    })
}

fn gps_clock(tags: &Value) -> Option<(DateTime<Utc>, &'static str)> {
    if let Some(utc) = tag_str(tags, &["GPSDateTime"]).and_then(parse_datetime_utc_z) {
        return Some((utc, "GPSDateTime"));
    }
    let date = tag_str(tags, &["GPSDateStamp"])?;
    let time = tag_str(tags, &["GPSTimeStamp"])?;
    parse_datetime_utc_z(&format!("{date} {time}Z")).map(|utc| (utc, "GPSDateStamp/GPSTimeStamp"))
}
