//! Reading photo facts out of a metadata extractor's tag mapping.
//!
//! Extractors differ in how they shape their output: flat (`GPSLatitude`), grouped one level
//! deep (`{"Time": {"DateTimeOriginal": ..}}`) or nested (`xmp.GPano.ProjectionType`). Lookups
//! here accept all three.
pub mod gps;
pub mod pano;

use crate::model::LatLng;
use crate::time::{CaptureTime, resolve_capture_time};
use gps::{get_gps_info, read_degrees};
use pano::{PanoInfo, get_pano_info};
use serde_json::Value;

pub use gps::{GpsInfo, GpsValue};

/// Everything the photo model takes from embedded metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoMetadata {
    pub gps: Option<GpsInfo>,
    pub heading: Option<f64>,
    pub pano: PanoInfo,
    pub captured: Option<CaptureTime>,
}

impl PhotoMetadata {
    pub fn position(&self) -> Option<LatLng> {
        self.gps.as_ref().and_then(GpsInfo::position)
    }
}

const HEADING_TAGS: [&str; 5] = [
    "xmp.GPano.PoseHeadingDegrees",
    "PoseHeadingDegrees",
    "GPSImgDirection",
    "heading",
    "Heading",
];

pub fn read_photo_metadata(file_name: &str, tags: &Value) -> PhotoMetadata {
    let gps = get_gps_info(tags);
    let position = gps.as_ref().and_then(GpsInfo::position);
    PhotoMetadata {
        heading: read_degrees(tags, &HEADING_TAGS),
        pano: get_pano_info(file_name, tags),
        captured: resolve_capture_time(tags, position),
        gps,
    }
}

/// Finds the first present, non-null tag among `names`.
///
/// A name with dots is a path into nested objects. A plain name matches at the top level
/// first, then inside any top-level group object.
pub fn find_tag<'a>(tags: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| lookup(tags, name))
}

pub fn tag_str<'a>(tags: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| lookup(tags, name))
        .find_map(Value::as_str)
}

fn lookup<'a>(tags: &'a Value, name: &str) -> Option<&'a Value> {
    if name.contains('.') {
        return name
            .split('.')
            .try_fold(tags, |node, key| node.get(key))
            .filter(|v| !v.is_null());
    }
    if let Some(value) = tags.get(name).filter(|v| !v.is_null()) {
        return Some(value);
    }
    tags.as_object()?
        .values()
        .filter(|group| group.is_object())
        .find_map(|group| group.get(name).filter(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_tag_shapes() {
        let tags = json!({
            "Make": "Google",
            "Time": { "DateTimeOriginal": "2024:01:01 00:00:00" },
            "xmp": { "GPano": { "ProjectionType": "equirectangular" } },
            "Empty": null
        });
        assert_eq!(tag_str(&tags, &["Make"]), Some("Google"));
        assert_eq!(
            tag_str(&tags, &["DateTimeOriginal"]),
            Some("2024:01:01 00:00:00")
        );
        assert_eq!(
            tag_str(&tags, &["xmp.GPano.ProjectionType"]),
            Some("equirectangular")
        );
        assert!(find_tag(&tags, &["Empty"]).is_none());
        assert!(find_tag(&tags, &["Missing", "Make"]).is_some());
    }

    #[test]
    fn test_read_photo_metadata() {
        let tags = json!({
            "GPSLatitude": 52.379_189,
            "GPSLongitude": 4.899_431,
            "GPSImgDirection": 123.0,
            "DateTimeOriginal": "2024:07:01 12:00:00",
            "GPano": { "ProjectionType": "equirectangular", "PoseHeadingDegrees": 45.0 }
        });
        let meta = read_photo_metadata("sphere.jpg", &tags);

        assert!(meta.position().is_some());
        assert_eq!(meta.heading, Some(45.0), "Pose heading comes before GPS direction");
        assert!(meta.pano.panorama_hint);
        let captured = meta.captured.expect("Capture time should resolve");
        assert_eq!(
            captured.timezone.map(|tz| tz.name),
            Some("Europe/Amsterdam".to_string())
        );
    }
}
