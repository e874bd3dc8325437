//! The portable site bundle (`index.html`, `data.json`, `assets/`, optional `lib/`) and the
//! single-page variant with media inlined as data URLs.
use super::naming::pack_assets;
use super::{ExportOptions, ExportedPhoto, ProjectPayload, data_url, parse_data_url};
use crate::archive::{Asset, AssetIndex, is_image_name, is_video_name};
use crate::error::{PhotoMapError, Result};
use crate::model::{LatLng, MediaRef, Photo, TrackCollection};
use crate::readers::read_geojson_value;
use crate::registry::PhotoRegistry;
use crate::time::parse_timestamp;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const VIEWER_TEMPLATE: &str = include_str!("viewer.html");
const DATA_FILE: &str = "data.json";
const INDEX_FILE: &str = "index.html";
const ASSET_DIR: &str = "assets";
const LIB_DIR: &str = "lib";

const CDN_LIBRARIES: [&str; 4] = [
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
    "https://unpkg.com/pannellum@2.5.6/build/pannellum.css",
    "https://unpkg.com/pannellum@2.5.6/build/pannellum.js",
];

lazy_static! {
    static ref EMBEDDED_DATA_RE: Regex =
        Regex::new(r#"(?s)<script id="__DATA__" type="application/json">(.*?)</script>"#).unwrap();
}

/// Where the viewer page loads Leaflet and Pannellum from.
#[derive(Debug, Clone, Default)]
pub enum ViewerLibraries {
    /// Public CDN links.
    #[default]
    Cdn,
    /// Files copied into `lib/` and linked relatively, for fully offline bundles.
    Vendored(Vec<(String, Vec<u8>)>),
}

impl ViewerLibraries {
    fn tags(&self) -> String {
        let urls: Vec<String> = match self {
            ViewerLibraries::Cdn => CDN_LIBRARIES.iter().map(|url| url.to_string()).collect(),
            ViewerLibraries::Vendored(files) => files
                .iter()
                .map(|(name, _)| format!("{LIB_DIR}/{name}"))
                .collect(),
        };
        urls.iter()
            .filter_map(|url| {
                if url.ends_with(".css") {
                    Some(format!("<link rel=\"stylesheet\" href=\"{url}\">"))
                } else if url.ends_with(".js") {
                    Some(format!("<script src=\"{url}\"></script>"))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A site bundle held in memory, as relative path and contents.
#[derive(Debug, Clone)]
pub struct SiteBundle {
    pub payload: ProjectPayload,
    files: Vec<(String, Vec<u8>)>,
}

impl SiteBundle {
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, bytes)| (path.as_str(), bytes.as_slice()))
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files().find(|(p, _)| *p == path).map(|(_, bytes)| bytes)
    }

    /// Writes every file below `dir`, creating folders as needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        for (path, bytes) in &self.files {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, bytes)?;
        }
        info!("Wrote site bundle with {} files to {}", self.files.len(), dir.display());
        Ok(())
    }

    /// The bundle as one zip archive.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, bytes) in &self.files {
            writer.start_file(path.as_str(), options)?;
            writer.write_all(bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// JSON that is safe inside a `<script>` element.
fn script_safe_json(payload: &ProjectPayload) -> Result<String> {
    Ok(serde_json::to_string(payload)?.replace('<', "\\u003c"))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('{', "&#123;")
}

fn render_page(payload: &ProjectPayload, libraries: &ViewerLibraries) -> Result<String> {
    let data = script_safe_json(payload)?;
    Ok(VIEWER_TEMPLATE
        .replacen("{{TITLE}}", &escape_html(&payload.project.title), 1)
        .replacen("{{LIBRARIES}}", &libraries.tags(), 1)
        .replacen("{{DATA}}", &data, 1))
}

/// Builds the site bundle.
///
/// Photo media is written under `assets/` with collision-free names, and `data.json` refers
/// to each file by `assetName`. `index.html` embeds the same JSON so the page also works
/// from `file://`; without it the page falls back to fetching `data.json`.
pub fn build_site_bundle(
    registry: &PhotoRegistry,
    tracks: &TrackCollection,
    options: &ExportOptions,
    libraries: &ViewerLibraries,
) -> Result<SiteBundle> {
    let mut payload = ProjectPayload::build(registry, tracks, options);
    let assets = if options.include_media {
        pack_assets(registry.iter())
    } else {
        Vec::new()
    };
    let names: HashMap<&str, &str> = assets
        .iter()
        .map(|asset| (asset.photo_id, asset.name.as_str()))
        .collect();
    for photo in &mut payload.photos {
        photo.src = None;
        photo.asset_name = names.get(photo.id.as_str()).map(|name| name.to_string());
    }

    let mut files = vec![
        (INDEX_FILE.to_string(), render_page(&payload, libraries)?.into_bytes()),
        (DATA_FILE.to_string(), serde_json::to_vec_pretty(&payload)?),
    ];
    files.extend(
        assets
            .iter()
            .map(|asset| (format!("{ASSET_DIR}/{}", asset.name), asset.bytes.to_vec())),
    );
    if let ViewerLibraries::Vendored(libs) = libraries {
        files.extend(
            libs.iter()
                .map(|(name, bytes)| (format!("{LIB_DIR}/{name}"), bytes.clone())),
        );
    }
    debug!("Built site bundle: {} photos, {} assets", payload.photos.len(), assets.len());
    Ok(SiteBundle { payload, files })
}

/// A single self-contained page. Media is inlined as data URLs unless `include_media` is off.
pub fn write_single_html(
    registry: &PhotoRegistry,
    tracks: &TrackCollection,
    options: &ExportOptions,
) -> Result<String> {
    let mut payload = ProjectPayload::build(registry, tracks, options);
    if options.include_media {
        let media: HashMap<&str, String> = registry
            .iter()
            .filter_map(|photo| {
                let media = photo.media.as_ref()?;
                Some((photo.id(), data_url(media.mime(), media.bytes()?)))
            })
            .collect();
        for photo in &mut payload.photos {
            photo.src = media.get(photo.id.as_str()).cloned();
        }
    }
    render_page(&payload, &ViewerLibraries::Cdn)
}

/// What a site bundle holds, read back into the model.
#[derive(Debug, Default)]
pub struct SiteContent {
    pub title: String,
    pub photos: Vec<Photo>,
    pub tracks: TrackCollection,
}

/// Pulls the payload out of `data.json`, or failing that out of the page's embedded copy.
fn payload_from(data_json: Option<&[u8]>, index_html: Option<&[u8]>) -> Result<ProjectPayload> {
    if let Some(bytes) = data_json {
        return Ok(serde_json::from_slice(bytes)?);
    }
    let html = index_html
        .map(String::from_utf8_lossy)
        .ok_or_else(|| PhotoMapError::malformed("site bundle", "neither data.json nor index.html found"))?;
    let embedded = EMBEDDED_DATA_RE
        .captures(&html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|json| !json.is_empty())
        .ok_or_else(|| PhotoMapError::malformed("site bundle", "index.html carries no embedded data"))?;
    Ok(serde_json::from_str(&embedded)?)
}

fn photo_from_export(exported: ExportedPhoto, assets: &Arc<AssetIndex>) -> Photo {
    let media = match (&exported.asset_name, &exported.src) {
        (Some(name), _) => assets
            .resolve(&format!("{ASSET_DIR}/{name}"))
            .map(|key| MediaRef::Asset {
                key: key.to_string(),
                index: Arc::clone(assets),
            }),
        (None, Some(src)) => parse_data_url(src).map(|(mime, bytes)| MediaRef::inline(bytes, mime)),
        (None, None) => None,
    };
    if media.is_none() && (exported.asset_name.is_some() || exported.src.is_some()) {
        warn!("Media of {} is missing from the bundle", exported.name);
    }
    let position = exported.lat_lng().and_then(|(lat, lng)| LatLng::new(lat, lng).ok());

    let mut photo = Photo::builder()
        .name(exported.name)
        .maybe_media(media)
        .width(exported.width)
        .height(exported.height)
        .maybe_position(position)
        .maybe_altitude(exported.alt)
        .kind(exported.kind)
        .yaw(exported.yaw)
        .pitch(exported.pitch)
        .maybe_bearing(exported.bearing)
        .maybe_captured_at(exported.captured_at.as_deref().and_then(parse_timestamp))
        .title(exported.title)
        .description(exported.description)
        .author(exported.author)
        .license(exported.license)
        .tags(exported.tags.into_iter().collect())
        .hidden(exported.hidden)
        .build();
    photo.set_id(exported.id);
    photo
}

fn content_from(payload: ProjectPayload, assets: AssetIndex) -> Result<SiteContent> {
    let assets = Arc::new(assets);
    let tracks = read_geojson_value(&payload.annotations)?;
    let photos = payload
        .photos
        .into_iter()
        .map(|exported| photo_from_export(exported, &assets))
        .collect();
    Ok(SiteContent {
        title: payload.project.title,
        photos,
        tracks,
    })
}

fn is_media_path(path: &str) -> bool {
    is_image_name(path) || is_video_name(path)
}

/// Reads a bundle written by [`SiteBundle::write_to_dir`].
pub fn read_site_bundle_dir(dir: &Path) -> Result<SiteContent> {
    let read_optional = |name: &str| -> Result<Option<Vec<u8>>> {
        let path = dir.join(name);
        if path.is_file() { Ok(Some(fs::read(path)?)) } else { Ok(None) }
    };
    let payload = payload_from(
        read_optional(DATA_FILE)?.as_deref(),
        read_optional(INDEX_FILE)?.as_deref(),
    )?;

    let mut assets = AssetIndex::new();
    let asset_dir = dir.join(ASSET_DIR);
    if asset_dir.is_dir() {
        for entry in WalkDir::new(&asset_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if is_media_path(&relative) {
                assets.insert(Asset::new(relative, fs::read(path)?));
            }
        }
    }
    content_from(payload, assets)
}

/// Reads a bundle zipped by [`SiteBundle::to_zip`] or by hand. The files may sit inside one
/// top-level folder.
pub fn read_site_bundle_zip(bytes: &[u8]) -> Result<SiteContent> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PhotoMapError::ArchiveUnreadable(e.to_string()))?;
    let mut data_json = None;
    let mut index_html = None;
    let mut assets = AssetIndex::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        let base = name.rsplit('/').next().unwrap_or(&name).to_ascii_lowercase();
        let wanted = base == DATA_FILE || base == INDEX_FILE || is_media_path(&name);
        if !wanted {
            continue;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        if base == DATA_FILE && data_json.is_none() {
            data_json = Some(buf);
        } else if base == INDEX_FILE && index_html.is_none() {
            index_html = Some(buf);
        } else if is_media_path(&name) {
            assets.insert(Asset::new(name, buf));
        }
    }

    let payload = payload_from(data_json.as_deref(), index_html.as_deref())?;
    content_from(payload, assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::zip_bytes;
    use crate::model::{Coord, Geometry, PhotoKind, TrackFeature};
    use chrono::{TimeZone, Utc};

    fn options() -> ExportOptions {
        ExportOptions::builder()
            .project_title("Coast </script> walk")
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .build()
    }

    fn fixture() -> (PhotoRegistry, TrackCollection) {
        let mut registry = PhotoRegistry::new();
        for (bytes, lat) in [(b"one", 52.0), (b"two", 52.1)] {
            registry.insert(
                Photo::builder()
                    .name("photo.jpg")
                    .media(MediaRef::inline(bytes.to_vec(), "image/jpeg"))
                    .width(4000)
                    .height(2000)
                    .position(LatLng::new(lat, 4.0).unwrap())
                    .bearing(90.0)
                    .build(),
            );
        }
        registry.insert(Photo::builder().name("note.jpg").title("No media").build());
        let tracks = TrackCollection::from(vec![TrackFeature::new(
            "A",
            Geometry::Point(Coord::new(4.0, 52.0)),
        )]);
        (registry, tracks)
    }

    #[test]
    fn test_bundle_layout() {
        let (registry, tracks) = fixture();
        let bundle = build_site_bundle(&registry, &tracks, &options(), &ViewerLibraries::Cdn).unwrap();
        let paths: Vec<&str> = bundle.files().map(|(p, _)| p).collect();
        assert_eq!(paths, ["index.html", "data.json", "assets/photo.jpg", "assets/photo_1.jpg"]);

        let data: serde_json::Value = serde_json::from_slice(bundle.file("data.json").unwrap()).unwrap();
        assert_eq!(data["photos"][1]["assetName"], "photo_1.jpg");
        assert!(data["photos"][1].get("src").is_none());
        assert!(data["photos"][2].get("assetName").is_none());

        let html = String::from_utf8(bundle.file("index.html").unwrap().to_vec()).unwrap();
        assert!(html.contains("leaflet.js"));
        assert!(!html.contains("</script> walk"), "Embedded JSON must not close the script");
        assert!(html.contains("<title>Coast &lt;/script&gt; walk</title>"));
    }

    #[test]
    fn test_vendored_libraries() {
        let libraries = ViewerLibraries::Vendored(vec![
            ("leaflet.js".to_string(), b"js".to_vec()),
            ("leaflet.css".to_string(), b"css".to_vec()),
        ]);
        let bundle =
            build_site_bundle(&PhotoRegistry::new(), &TrackCollection::new(), &options(), &libraries)
                .unwrap();
        assert_eq!(bundle.file("lib/leaflet.js"), Some(&b"js"[..]));
        let html = String::from_utf8(bundle.file("index.html").unwrap().to_vec()).unwrap();
        assert!(html.contains("<script src=\"lib/leaflet.js\"></script>"));
        assert!(html.contains("<link rel=\"stylesheet\" href=\"lib/leaflet.css\">"));
        assert!(!html.contains("unpkg.com"));
    }

    #[test]
    fn test_dir_round_trip() {
        let (registry, tracks) = fixture();
        let bundle = build_site_bundle(&registry, &tracks, &options(), &ViewerLibraries::Cdn).unwrap();
        let dir = tempfile::tempdir().unwrap();
        bundle.write_to_dir(dir.path()).unwrap();

        let content = read_site_bundle_dir(dir.path()).unwrap();
        assert_eq!(content.title, "Coast </script> walk");
        assert_eq!(content.tracks, tracks);
        assert_eq!(content.photos.len(), 3);
        let second = &content.photos[1];
        let original = registry.iter().nth(1).unwrap();
        assert_eq!(second.id(), original.id());
        assert_eq!(second.kind(), PhotoKind::Panorama);
        assert_eq!(second.bearing(), Some(90.0));
        assert_eq!(second.media.as_ref().and_then(|m| m.bytes()), Some(&b"two"[..]));
        assert!(content.photos[2].media.is_none());
    }

    #[test]
    fn test_zip_round_trip_from_embedded_page() {
        let (registry, tracks) = fixture();
        let bundle = build_site_bundle(&registry, &tracks, &options(), &ViewerLibraries::Cdn).unwrap();
        let index = bundle.file("index.html").unwrap();
        let asset = bundle.file("assets/photo.jpg").unwrap();
        let zipped = zip_bytes(&[("site/index.html", index), ("site/assets/photo.jpg", asset)]);

        let content = read_site_bundle_zip(&zipped).unwrap();
        assert_eq!(content.photos.len(), 3);
        assert_eq!(content.photos[0].media.as_ref().and_then(|m| m.bytes()), Some(&b"one"[..]));
        assert!(content.photos[1].media.is_none(), "photo_1.jpg was left out of the zip");

        let full = read_site_bundle_zip(&bundle.to_zip().unwrap()).unwrap();
        assert_eq!(full.photos[1].media.as_ref().and_then(|m| m.bytes()), Some(&b"two"[..]));
    }

    #[test]
    fn test_single_html_inlines_media() {
        let (registry, tracks) = fixture();
        let html = write_single_html(&registry, &tracks, &options()).unwrap();
        assert!(html.contains("data:image/jpeg;base64,b25l"));

        let page = zip_bytes(&[("index.html", html.as_bytes())]);
        let content = read_site_bundle_zip(&page).unwrap();
        assert_eq!(content.photos[0].media.as_ref().and_then(|m| m.bytes()), Some(&b"one"[..]));
        assert_eq!(content.photos[0].media.as_ref().map(|m| m.mime()), Some("image/jpeg"));
    }

    #[test]
    fn test_missing_payload() {
        let zipped = zip_bytes(&[("assets/a.jpg", b"x")]);
        let err = read_site_bundle_zip(&zipped).unwrap_err();
        assert!(matches!(err, PhotoMapError::MalformedInput { format: "site bundle", .. }));
    }
}
