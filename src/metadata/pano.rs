use super::{find_tag, tag_str};
use crate::metadata::gps::read_degrees;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanoInfo {
    /// Any GPano projection tag, or a `.pano.` file name.
    pub panorama_hint: bool,
    pub projection_type: Option<String>,
    /// `GPano:PoseHeadingDegrees`, used as the initial viewer yaw.
    pub pose_heading: Option<f64>,
}

const PROJECTION_TAGS: [&str; 5] = [
    "XMP-GPano:ProjectionType",
    "GPano:ProjectionType",
    "xmp.GPano.ProjectionType",
    "GPano.ProjectionType",
    "ProjectionType",
];

const POSE_HEADING_TAGS: [&str; 4] = [
    "XMP-GPano:PoseHeadingDegrees",
    "xmp.GPano.PoseHeadingDegrees",
    "GPano.PoseHeadingDegrees",
    "PoseHeadingDegrees",
];

pub fn get_pano_info(file_name: &str, tags: &Value) -> PanoInfo {
    let has_pano_in_filename = file_name.to_lowercase().contains(".pano.");

    let projection_type = tag_str(tags, &PROJECTION_TAGS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| {
            // Some extractors hand over the GPano block as an object with a non-string value.
            find_tag(tags, &PROJECTION_TAGS)
                .filter(|v| !v.is_null() && v.as_bool() != Some(false))
                .map(|v| v.to_string())
        });

    PanoInfo {
        panorama_hint: projection_type.is_some() || has_pano_in_filename,
        projection_type,
        pose_heading: read_degrees(tags, &POSE_HEADING_TAGS),
    }
}
