//! Serializers: KML, KMZ, the portable site bundle and a single HTML page.
pub mod geojson;
pub mod kml;
pub mod kmz;
pub mod naming;
pub mod site;

use crate::model::{Photo, PhotoKind, TrackCollection};
use crate::registry::PhotoRegistry;
use crate::time::format_timestamp;
use base64::{Engine as _, engine::general_purpose};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use geojson::tracks_to_geojson;
pub use kml::{KML_MIME, KmlFlavor, write_kml};
pub use kmz::{KMZ_MIME, write_kmz};
pub use naming::{AssetNamer, safe_file_name};
pub use site::{
    SiteBundle, SiteContent, ViewerLibraries, build_site_bundle, read_site_bundle_dir,
    read_site_bundle_zip, write_single_html,
};

pub const DEFAULT_PROJECT_TITLE: &str = "My 360 Map";
pub const DEFAULT_COORDINATE_PRECISION: u32 = 5;
pub const PROJECTION: &str = "EPSG:4326";

/// Settings shared by every exporter.
#[derive(Debug, Clone, Builder)]
pub struct ExportOptions {
    /// Decimal places kept for photo coordinates.
    #[builder(default = DEFAULT_COORDINATE_PRECISION)]
    pub coordinate_precision: u32,
    #[builder(default = DEFAULT_PROJECT_TITLE.to_string(), into)]
    pub project_title: String,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    /// Write media files (KMZ, site bundle) or inline them (single HTML).
    #[builder(default = true)]
    pub include_media: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub title: String,
    pub created_at: String,
    pub projection: String,
    pub base_layers: Vec<String>,
}

impl ProjectInfo {
    pub fn new(options: &ExportOptions) -> Self {
        Self {
            title: options.project_title.clone(),
            created_at: format_timestamp(&options.created_at),
            projection: PROJECTION.to_string(),
            base_layers: vec!["osm".to_string(), "satellite".to_string()],
        }
    }
}

/// One photo as written to `data.json` and used by the KML writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPhoto {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PhotoKind,
    /// Inline `data:` URL, only in single-page exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// File name under `assets/` or `files/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
    pub yaw: f64,
    pub pitch: f64,
    pub bearing: Option<f64>,
    pub captured_at: Option<String>,
    pub tags: Vec<String>,
    pub title: String,
    pub description: String,
    pub license: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    (value * factor).round() / factor
}

impl ExportedPhoto {
    pub fn from_photo(photo: &Photo, precision: u32) -> Self {
        let position = photo.position();
        Self {
            id: photo.id().to_string(),
            name: photo.name.clone(),
            kind: photo.kind(),
            src: None,
            asset_name: None,
            width: photo.width,
            height: photo.height,
            lat: position.map(|p| round_to(p.lat(), precision)),
            lng: position.map(|p| round_to(p.lng(), precision)),
            alt: photo.altitude,
            yaw: photo.yaw,
            pitch: photo.pitch,
            bearing: photo.bearing(),
            captured_at: photo.captured_at.as_ref().map(format_timestamp),
            tags: photo.tags.iter().cloned().collect(),
            title: photo.title.clone(),
            description: photo.description.clone(),
            license: photo.license.clone(),
            author: photo.author.clone(),
            hidden: photo.hidden,
        }
    }

    /// Both coordinates, when the photo is placed.
    pub fn lat_lng(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }

    /// The title, or the file name when the title is empty.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// The export snapshot: project metadata, photos and tracks as GeoJSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub project: ProjectInfo,
    pub photos: Vec<ExportedPhoto>,
    pub annotations: Value,
}

impl ProjectPayload {
    /// Builds a payload without media. Writers fill `asset_name` or `src` themselves.
    pub fn build(registry: &PhotoRegistry, tracks: &TrackCollection, options: &ExportOptions) -> Self {
        Self {
            project: ProjectInfo::new(options),
            photos: registry
                .iter()
                .map(|photo| ExportedPhoto::from_photo(photo, options.coordinate_precision))
                .collect(),
            annotations: tracks_to_geojson(tracks),
        }
    }
}

/// `data:<mime>;base64,...`
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    let b64 = general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{b64}")
}

/// Splits a base64 `data:` URL into MIME type and bytes.
pub fn parse_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let (header, b64) = url.strip_prefix("data:")?.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = general_purpose::STANDARD.decode(b64.trim()).ok()?;
    Some((mime.to_string(), bytes))
}
