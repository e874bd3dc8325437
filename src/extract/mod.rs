//! Recovers photos from a parsed KML document.
//!
//! Two passes run in a fixed order: `PhotoOverlay` elements first, then `Placemark`s whose
//! description embeds an image or video. An asset claimed by an overlay is not imported a
//! second time by a placemark, so the overlay's camera pose wins.
pub mod html;

use crate::archive::{AssetIndex, is_video_name};
use crate::error::{SkipReason, Skipped};
use crate::model::{LatLng, MediaRef, Photo, PhotoKind};
use crate::readers::xml::{child_text, descendants, is, parse_leading_f64, select_text};
use crate::services::ImageCodec;
use crate::time::parse_timestamp;
use html::{MediaHref, find_media_hrefs, html_to_text};
use roxmltree::{Document, Node, NodeId};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Photos found in a document, and the records that could not be imported.
#[derive(Debug, Default)]
pub struct Extraction {
    pub photos: Vec<Photo>,
    pub skipped: Vec<Skipped>,
    /// Placemarks turned into photos. The geometry reader leaves these out.
    pub(crate) consumed: HashSet<NodeId>,
}

/// A way of reading a bearing off an element. Strategies are tried in order.
type BearingStrategy = fn(Node, &ExtendedData) -> Option<f64>;

const OVERLAY_BEARING: [BearingStrategy; 2] = [camera_heading, extended_bearing];
const PLACEMARK_BEARING: [BearingStrategy; 2] = [icon_style_heading, extended_bearing];

fn camera_heading(node: Node, _: &ExtendedData) -> Option<f64> {
    select_text(node, &["Camera", "heading"]).and_then(|t| parse_leading_f64(&t))
}

fn icon_style_heading(node: Node, _: &ExtendedData) -> Option<f64> {
    select_text(node, &["Style", "IconStyle", "heading"]).and_then(|t| parse_leading_f64(&t))
}

fn extended_bearing(_: Node, data: &ExtendedData) -> Option<f64> {
    data.number("bearing")
}

fn first_bearing(strategies: &[BearingStrategy], node: Node, data: &ExtendedData) -> Option<f64> {
    strategies.iter().find_map(|strategy| strategy(node, data))
}

/// `<ExtendedData>` name/value pairs (`Data` and `SimpleData`).
#[derive(Debug, Default)]
struct ExtendedData(HashMap<String, String>);

impl ExtendedData {
    fn read(node: Node) -> Self {
        let mut values = HashMap::new();
        for data in descendants(node, "ExtendedData") {
            for entry in data.descendants() {
                let Some(name) = entry.attribute("name") else {
                    continue;
                };
                let value = if is(entry, "Data") {
                    child_text(entry, "value")
                } else if is(entry, "SimpleData") {
                    Some(entry.text().unwrap_or_default().trim().to_string())
                } else {
                    None
                };
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    values.entry(name.to_string()).or_insert(value);
                }
            }
        }
        Self(values)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_leading_f64)
    }

    fn dimension(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    /// Written by our own exporter: such records are photos even without media.
    fn is_exported_photo(&self) -> bool {
        self.get("id").is_some() && self.get("type").and_then(PhotoKind::parse).is_some()
    }
}

/// What a pass gathered about one element before it becomes a [`Photo`].
#[derive(Clone)]
struct Candidate {
    title: Option<String>,
    description: String,
    position: LatLng,
    altitude: Option<f64>,
    bearing: Option<f64>,
    yaw: Option<f64>,
    pitch: Option<f64>,
    captured: Option<String>,
}

/// Walks a KML document for photo records.
pub struct MediaExtractor<'a> {
    assets: &'a Arc<AssetIndex>,
    codec: Option<&'a dyn ImageCodec>,
    claimed: HashSet<String>,
    out: Extraction,
}

impl<'a> MediaExtractor<'a> {
    /// `codec`, when given, measures every resolved image. Without it, pixel sizes come from
    /// the document's `ExtendedData` or stay 0.
    pub fn new(assets: &'a Arc<AssetIndex>, codec: Option<&'a dyn ImageCodec>) -> Self {
        Self {
            assets,
            codec,
            claimed: HashSet::new(),
            out: Extraction::default(),
        }
    }

    pub fn extract(mut self, doc: &Document) -> Extraction {
        let root = doc.root_element();
        let overlays = descendants(root, "PhotoOverlay");
        for overlay in std::iter::once(root).filter(|n| is(*n, "PhotoOverlay")).chain(overlays) {
            let result = self.overlay_photo(overlay);
            self.record("PhotoOverlay", overlay, Some(result));
        }

        let placemarks = descendants(root, "Placemark");
        for placemark in std::iter::once(root).filter(|n| is(*n, "Placemark")).chain(placemarks) {
            let result = self.placemark_photo(placemark);
            self.record("Placemark", placemark, result);
        }

        debug!(
            "Extracted {} photos, skipped {} records",
            self.out.photos.len(),
            self.out.skipped.len()
        );
        self.out
    }

    /// Files the outcome of one element. `None` means the element was never a photo record.
    fn record(
        &mut self,
        record: &str,
        node: Node,
        result: Option<Result<Option<Photo>, SkipReason>>,
    ) {
        match result {
            None => {}
            Some(Ok(photo)) => {
                self.out.consumed.insert(node.id());
                if let Some(photo) = photo {
                    self.out.photos.push(photo);
                }
            }
            Some(Err(reason)) => {
                let name = child_text(node, "name").unwrap_or_default();
                debug!("Skipping {record} \"{name}\": {reason}");
                self.out.skipped.push(Skipped {
                    record: record.to_string(),
                    name,
                    reason,
                });
            }
        }
    }

    /// `Ok(None)` is an overlay whose asset was already imported.
    fn overlay_photo(&mut self, node: Node) -> Result<Option<Photo>, SkipReason> {
        let href = select_text(node, &["Icon", "href"]).ok_or(SkipReason::MissingHref)?;
        let coordinates =
            select_text(node, &["Point", "coordinates"]).ok_or(SkipReason::MissingCoordinates)?;
        let data = ExtendedData::read(node);

        // Without a stored yaw the camera heading orients the panorama.
        let heading = camera_heading(node, &data);
        let candidate = Candidate {
            title: child_text(node, "name"),
            description: data
                .get("description")
                .map(str::to_string)
                .or_else(|| child_text(node, "description"))
                .unwrap_or_default(),
            bearing: first_bearing(&OVERLAY_BEARING, node, &data),
            yaw: data.number("yaw").or(heading),
            pitch: select_text(node, &["Camera", "tilt"])
                .and_then(|t| parse_leading_f64(&t))
                .or_else(|| data.number("pitch")),
            captured: select_text(node, &["TimeStamp", "when"]),
            ..point_of(&coordinates)?
        };
        self.build(MediaHref::Image(href), candidate, &data)
    }

    fn placemark_photo(&mut self, node: Node) -> Option<Result<Option<Photo>, SkipReason>> {
        let coordinates = select_text(node, &["Point", "coordinates"])?;
        let data = ExtendedData::read(node);
        let description_html = child_text(node, "description").unwrap_or_default();
        let media = find_media_hrefs(&description_html);
        if media.is_empty() && !data.is_exported_photo() {
            return None;
        }

        let result = point_of(&coordinates).and_then(|point| {
            let candidate = Candidate {
                title: child_text(node, "name"),
                description: data
                    .get("description")
                    .map(str::to_string)
                    .unwrap_or_else(|| html_to_text(&description_html)),
                bearing: first_bearing(&PLACEMARK_BEARING, node, &data),
                yaw: data.number("yaw"),
                pitch: data.number("pitch"),
                captured: select_text(node, &["TimeStamp", "when"]),
                ..point
            };
            if media.is_empty() {
                return Ok(Some(self.photo_without_media(candidate, &data)));
            }
            // A video that is missing from the archive falls back to the image.
            let mut first_missing = None;
            for href in media.in_priority() {
                match self.build(href, candidate.clone(), &data) {
                    Err(SkipReason::UnresolvedAssetReference(missing)) => {
                        first_missing.get_or_insert(missing);
                    }
                    other => return other,
                }
            }
            Err(SkipReason::UnresolvedAssetReference(first_missing.unwrap_or_default()))
        });
        Some(result)
    }

    fn build(
        &mut self,
        media: MediaHref,
        candidate: Candidate,
        data: &ExtendedData,
    ) -> Result<Option<Photo>, SkipReason> {
        let href = media.href();
        let Some(key) = self.assets.resolve(href).map(str::to_string) else {
            if data.is_exported_photo() && self.assets.is_empty() {
                return Ok(Some(self.photo_without_media(candidate, data)));
            }
            return Err(SkipReason::UnresolvedAssetReference(href.to_string()));
        };
        if !self.claimed.insert(key.clone()) {
            debug!("Asset {key} is already imported, keeping the earlier record");
            return Ok(None);
        }

        let Some(asset) = self.assets.get(&key) else {
            return Err(SkipReason::UnresolvedAssetReference(href.to_string()));
        };
        let name = asset.file_name().to_string();
        let is_video = asset.is_video() || is_video_name(&name);
        let (width, height) = match self.codec.filter(|_| !is_video) {
            Some(codec) => match codec.decode(&name, &asset.bytes) {
                Ok(decoded) => (decoded.width, decoded.height),
                Err(e) => {
                    warn!("Could not decode {name}: {e}");
                    stored_size(data)
                }
            },
            None => stored_size(data),
        };
        let media = MediaRef::Asset {
            key,
            index: Arc::clone(self.assets),
        };
        Ok(Some(assemble(name, Some(media), width, height, candidate, data)))
    }

    fn photo_without_media(&self, candidate: Candidate, data: &ExtendedData) -> Photo {
        let name = candidate.title.clone().unwrap_or_else(|| "Photo".to_string());
        let (width, height) = stored_size(data);
        assemble(name, None, width, height, candidate, data)
    }
}

fn stored_size(data: &ExtendedData) -> (u32, u32) {
    (
        data.dimension("width").unwrap_or(0),
        data.dimension("height").unwrap_or(0),
    )
}

/// Parses `lng,lat[,alt]`. Longitude comes first in KML.
fn point_of(coordinates: &str) -> Result<Candidate, SkipReason> {
    let invalid = || SkipReason::InvalidCoordinates(coordinates.to_string());
    let first = coordinates.split_whitespace().next().ok_or_else(invalid)?;
    let mut parts = first.split(',').map(|p| p.trim().parse::<f64>().ok());
    let (Some(Some(lng)), Some(Some(lat))) = (parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let altitude = parts.next().flatten().filter(|a| a.is_finite());
    let position = LatLng::new(lat, lng).map_err(|_| invalid())?;
    Ok(Candidate {
        title: None,
        description: String::new(),
        position,
        altitude,
        bearing: None,
        yaw: None,
        pitch: None,
        captured: None,
    })
}

fn assemble(
    name: String,
    media: Option<MediaRef>,
    width: u32,
    height: u32,
    candidate: Candidate,
    data: &ExtendedData,
) -> Photo {
    let tags: BTreeSet<String> = data
        .get("tags")
        .map(|tags| {
            tags.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut photo = Photo::builder()
        .name(name)
        .maybe_media(media)
        .width(width)
        .height(height)
        .position(candidate.position)
        .maybe_altitude(candidate.altitude)
        .maybe_kind(data.get("type").and_then(PhotoKind::parse))
        .yaw(candidate.yaw.unwrap_or(0.0))
        .pitch(candidate.pitch.unwrap_or(0.0))
        .maybe_bearing(candidate.bearing)
        .maybe_captured_at(candidate.captured.as_deref().and_then(parse_timestamp))
        .maybe_title(candidate.title)
        .description(candidate.description)
        .author(data.get("author").unwrap_or_default())
        .license(data.get("license").unwrap_or_default())
        .tags(tags)
        .hidden(data.get("hidden") == Some("true"))
        .build();
    if let Some(id) = data.get("id") {
        photo.set_id(id.to_string());
    }
    photo
}

/// Runs both passes over `doc`.
pub fn extract_photos(
    doc: &Document,
    assets: &Arc<AssetIndex>,
    codec: Option<&dyn ImageCodec>,
) -> Extraction {
    MediaExtractor::new(assets, codec).extract(doc)
}
