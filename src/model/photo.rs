use crate::archive::AssetIndex;
use crate::error::{PhotoMapError, Result};
use crate::geometry::{is_valid_lat_lng, normalize_bearing};
use bon::bon;
use chrono::{DateTime, Utc};
use rand::prelude::IndexedRandom;
use rand::rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

const ID_PREFIX: &str = "ph_";
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 7;

/// Width/height ratio that marks an equirectangular panorama, and the accepted deviation.
const PANORAMA_RATIO: f64 = 2.0;
const PANORAMA_RATIO_TOLERANCE: f64 = 0.02;

/// Returns a fresh `ph_xxxxxxx` identifier.
pub fn generate_photo_id() -> String {
    let mut rng = rng();
    let suffix: String = (0..ID_LEN)
        .filter_map(|_| ID_ALPHABET.choose(&mut rng))
        .map(|&b| b as char)
        .collect();
    format!("{ID_PREFIX}{suffix}")
}

/// True when the pixel size is (close to) 2:1.
pub fn is_panorama_by_size(width: u32, height: u32) -> bool {
    width > 0
        && height > 0
        && (f64::from(width) / f64::from(height) - PANORAMA_RATIO).abs() < PANORAMA_RATIO_TOLERANCE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PhotoKind {
    #[serde(rename = "photo")]
    Photo,
    #[serde(rename = "photo360")]
    Panorama,
    #[serde(rename = "video")]
    Video,
}

impl PhotoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhotoKind::Photo => "photo",
            PhotoKind::Panorama => "photo360",
            PhotoKind::Video => "video",
        }
    }

    /// Parses the exported type string. `pano`/`panorama` are accepted as aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" => Some(PhotoKind::Photo),
            "photo360" | "pano" | "panorama" => Some(PhotoKind::Panorama),
            "video" => Some(PhotoKind::Video),
            _ => None,
        }
    }
}

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    lat: f64,
    lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if is_valid_lat_lng(lat, lng) {
            Ok(Self { lat, lng })
        } else {
            Err(PhotoMapError::InvalidCoordinate { lat, lng })
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

/// Where a photo's bytes live.
#[derive(Clone)]
pub enum MediaRef {
    /// Bytes handed in directly, e.g. a dropped file.
    Inline { bytes: Arc<[u8]>, mime: String },
    /// An entry of an opened archive. The index is shared by every photo from that archive.
    Asset { key: String, index: Arc<AssetIndex> },
}

impl MediaRef {
    pub fn inline(bytes: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        MediaRef::Inline {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            MediaRef::Inline { bytes, .. } => Some(&bytes[..]),
            MediaRef::Asset { key, index } => index.get(key).map(|asset| asset.bytes.as_ref()),
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            MediaRef::Inline { mime, .. } => mime.as_str(),
            MediaRef::Asset { key, index } => index
                .get(key)
                .map(|asset| asset.mime.as_str())
                .unwrap_or("application/octet-stream"),
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime().starts_with("video/")
    }
}

impl std::fmt::Debug for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaRef::Inline { bytes, mime } => f
                .debug_struct("Inline")
                .field("len", &bytes.len())
                .field("mime", mime)
                .finish(),
            MediaRef::Asset { key, .. } => f.debug_struct("Asset").field("key", key).finish(),
        }
    }
}

/// A point-located photo, panorama or video.
#[derive(Debug, Clone)]
pub struct Photo {
    id: String,
    /// Original file name.
    pub name: String,
    kind: PhotoKind,
    kind_explicit: bool,
    pub media: Option<MediaRef>,
    pub width: u32,
    pub height: u32,
    position: Option<LatLng>,
    pub altitude: Option<f64>,
    pub yaw: f64,
    pub pitch: f64,
    bearing: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
    pub title: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub tags: BTreeSet<String>,
    pub hidden: bool,
}

#[bon]
impl Photo {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        media: Option<MediaRef>,
        #[builder(default)] width: u32,
        #[builder(default)] height: u32,
        position: Option<LatLng>,
        altitude: Option<f64>,
        /// Fixes the kind. Without it the kind is derived from the media and pixel size.
        kind: Option<PhotoKind>,
        /// Set when metadata marked the image as a panorama (GPano projection, `.pano.` name).
        #[builder(default)]
        panorama_hint: bool,
        #[builder(default)] yaw: f64,
        #[builder(default)] pitch: f64,
        bearing: Option<f64>,
        captured_at: Option<DateTime<Utc>>,
        /// Defaults to the file stem of `name`.
        #[builder(into)]
        title: Option<String>,
        #[builder(default, into)] description: String,
        #[builder(default, into)] author: String,
        #[builder(default, into)] license: String,
        #[builder(default)] tags: BTreeSet<String>,
        #[builder(default)] hidden: bool,
    ) -> Self {
        let is_video = media.as_ref().is_some_and(MediaRef::is_video);
        let (kind, kind_explicit) = match kind {
            Some(kind) => (kind, true),
            None if panorama_hint => (PhotoKind::Panorama, true),
            None if is_video => (PhotoKind::Video, true),
            None => (derive_kind(width, height), false),
        };
        let title = title.unwrap_or_else(|| file_stem(&name));

        Self {
            id: generate_photo_id(),
            name,
            kind,
            kind_explicit,
            media,
            width,
            height,
            position,
            altitude,
            yaw,
            pitch,
            bearing: bearing.and_then(normalize_bearing),
            captured_at,
            title,
            description,
            author,
            license,
            tags,
            hidden,
        }
    }
}

impl Photo {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keeps ids read back from an exported document.
    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn regenerate_id(&mut self) {
        self.id = generate_photo_id();
    }

    pub fn kind(&self) -> PhotoKind {
        self.kind
    }

    pub fn kind_is_explicit(&self) -> bool {
        self.kind_explicit
    }

    pub fn is_panorama(&self) -> bool {
        self.kind == PhotoKind::Panorama
    }

    /// Pins the kind; it will no longer follow the pixel size.
    pub fn set_kind(&mut self, kind: PhotoKind) {
        self.kind = kind;
        self.kind_explicit = true;
    }

    /// Drops an explicit kind and derives it from the current pixel size.
    pub fn set_kind_auto(&mut self) {
        self.kind_explicit = false;
        self.rederive_kind();
    }

    /// Re-derives the kind from the pixel size unless it was fixed explicitly.
    pub(crate) fn rederive_kind(&mut self) {
        if !self.kind_explicit {
            self.kind = derive_kind(self.width, self.height);
        }
    }

    pub fn position(&self) -> Option<LatLng> {
        self.position
    }

    pub fn set_position(&mut self, position: Option<LatLng>) {
        self.position = position;
    }

    pub fn bearing(&self) -> Option<f64> {
        self.bearing
    }

    /// Stores the bearing folded into `[0, 359.9]`. Non-finite values clear it.
    pub fn set_bearing(&mut self, bearing: Option<f64>) {
        self.bearing = bearing.and_then(normalize_bearing);
    }
}

fn derive_kind(width: u32, height: u32) -> PhotoKind {
    if is_panorama_by_size(width, height) {
        PhotoKind::Panorama
    } else {
        PhotoKind::Photo
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}
