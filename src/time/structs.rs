use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// The capture time resolved from a photo's metadata tags.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTime {
    /// The instant in UTC. This is what the photo's `captured_at` is set to.
    pub utc: DateTime<Utc>,

    /// The wall-clock time the camera recorded.
    pub local: NaiveDateTime,

    /// How `local` was tied to UTC, when anything other than a plain guess was possible.
    pub timezone: Option<TimeZoneInfo>,

    /// Tag(s) the time was read from.
    pub source: String,

    pub confidence: Confidence,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeZoneInfo {
    /// IANA name (`Europe/Amsterdam`), fixed offset string (`+02:00`) or `UTC`.
    pub name: String,
    /// Offset from UTC in seconds at the capture instant.
    pub offset_seconds: i32,
    /// How the zone was found, e.g. `IANA from GPS` or `OffsetTimeOriginal`.
    pub source: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Offset-aware tag, GPS zone or explicit offset tag.
    High,
    /// UTC from the GPS clock without a local time to confirm it.
    Medium,
    /// Local time taken as UTC.
    Low,
}
