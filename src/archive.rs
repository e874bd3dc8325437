//! KMZ containers: locating the KML document and indexing the media stored next to it.
use crate::error::{PhotoMapError, Result};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;

pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "m4v", "mov", "webm"];

/// Lower-cased extension of a file name or path, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type from the extension alone.
pub fn mime_for_name(name: &str) -> String {
    extension_of(name)
        .map(|ext| mime_guess::from_ext(&ext).first_or_octet_stream().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Normalizes an archive path or href for lookup: `\` becomes `/`, a leading `./` and repeated
/// slashes go away, percent escapes are decoded and the result is lower-cased.
pub fn normalize_path(path: &str) -> String {
    let slashed = path.replace('\\', "/");
    let trimmed = slashed.strip_prefix("./").unwrap_or(&slashed);
    let mut collapsed = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        if ch == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(ch);
    }
    let decoded = percent_decode_str(&collapsed)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or(collapsed);
    decoded.to_lowercase()
}

#[derive(Clone)]
pub struct Asset {
    /// Path as stored in the container.
    pub name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl Asset {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self {
            mime: mime_for_name(&name),
            name,
            bytes: bytes.into(),
        }
    }

    /// Last path segment of `name`.
    pub fn file_name(&self) -> &str {
        self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name)
    }

    pub fn is_video(&self) -> bool {
        self.mime.starts_with("video/")
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Read-only lookup from normalized path to asset, in archive order.
#[derive(Debug, Default)]
pub struct AssetIndex {
    keys: Vec<String>,
    assets: HashMap<String, Asset>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an asset under its normalized path. A later entry with the same key replaces the
    /// earlier one but keeps its position.
    pub fn insert(&mut self, asset: Asset) {
        let key = normalize_path(&asset.name);
        if self.assets.insert(key.clone(), asset).is_none() {
            self.keys.push(key);
        }
    }

    /// Exact lookup by normalized key.
    pub fn get(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    /// Resolves a document reference to the key of a stored asset.
    ///
    /// Tries the exact normalized path first, then any entry whose path ends in the same
    /// file name. A query string or fragment is ignored when the full href does not match.
    pub fn resolve(&self, href: &str) -> Option<&str> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.resolve_normalized(&normalize_path(href)).or_else(|| {
            let bare = href.split(['?', '#']).next().unwrap_or(href);
            if bare.len() == href.len() || bare.is_empty() {
                None
            } else {
                self.resolve_normalized(&normalize_path(bare))
            }
        })
    }

    fn resolve_normalized(&self, path: &str) -> Option<&str> {
        if let Some((key, _)) = self.assets.get_key_value(path) {
            return Some(key.as_str());
        }
        let base = path.rsplit('/').next().unwrap_or(path);
        if base.is_empty() {
            return None;
        }
        let suffix = format!("/{base}");
        self.keys
            .iter()
            .find(|key| key.ends_with(&suffix) || key.as_str() == base)
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Assets in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.keys
            .iter()
            .filter_map(|key| self.assets.get(key).map(|asset| (key.as_str(), asset)))
    }
}

/// An opened KMZ: the primary KML text and the media index.
#[derive(Debug, Clone)]
pub struct KmzArchive {
    pub kml_path: String,
    pub kml_text: String,
    pub assets: Arc<AssetIndex>,
}

fn is_media_entry(name: &str, include_videos: bool) -> bool {
    is_image_name(name) || (include_videos && is_video_name(name))
}

/// Opens a zip byte stream as a KMZ.
///
/// The KML is the entry named `doc.kml` (in any folder), or else the first `*.kml`.
pub fn open_kmz(bytes: &[u8], include_videos: bool) -> Result<KmzArchive> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| PhotoMapError::ArchiveUnreadable(e.to_string()))?;

    let names: Vec<(usize, String)> = (0..zip.len())
        .filter_map(|i| {
            let entry = zip.by_index_raw(i).ok()?;
            (!entry.is_dir()).then(|| (i, entry.name().to_string()))
        })
        .collect();

    let is_kml = |name: &str| name.to_ascii_lowercase().ends_with(".kml");
    let is_doc_kml = |name: &str| {
        let lower = normalize_path(name);
        lower == "doc.kml" || lower.ends_with("/doc.kml")
    };
    let (kml_index, kml_path) = names
        .iter()
        .find(|(_, name)| is_doc_kml(name))
        .or_else(|| names.iter().find(|(_, name)| is_kml(name)))
        .cloned()
        .ok_or(PhotoMapError::MissingPrimaryDocument)?;

    let kml_bytes = read_entry(&mut zip, kml_index, &kml_path)?;
    let kml_text = String::from_utf8_lossy(&kml_bytes)
        .trim_start_matches('\u{feff}')
        .to_string();

    let mut assets = AssetIndex::new();
    for (index, name) in names.iter().filter(|(_, n)| is_media_entry(n, include_videos)) {
        let data = read_entry(&mut zip, *index, name)?;
        assets.insert(Asset::new(name.clone(), data));
    }
    debug!(
        "Opened KMZ: primary document {kml_path}, {} media entries",
        assets.len()
    );

    Ok(KmzArchive {
        kml_path,
        kml_text,
        assets: Arc::new(assets),
    })
}

fn read_entry(zip: &mut ZipArchive<Cursor<&[u8]>>, index: usize, name: &str) -> Result<Vec<u8>> {
    let mut entry = zip
        .by_index(index)
        .map_err(|e| PhotoMapError::ArchiveUnreadable(format!("{name}: {e}")))?;
    let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry
        .read_to_end(&mut data)
        .map_err(|e| PhotoMapError::ArchiveUnreadable(format!("{name}: {e}")))?;
    Ok(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Builds an in-memory zip from `(path, bytes)` pairs.
    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(".\\Files\\IMG%201.JPG"), "files/img 1.jpg");
        assert_eq!(normalize_path("./a//b///c.png"), "a/b/c.png");
        assert_eq!(normalize_path("bad%zzescape.jpg"), "bad%zzescape.jpg");
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(extension_of("dir.v2/photo.JPEG").as_deref(), Some("jpeg"));
        assert_eq!(extension_of("README"), None);
        assert!(is_image_name("a/b/c.TIF"));
        assert!(is_video_name("clip.MOV"));
        assert_eq!(mime_for_name("x.png"), "image/png");
        assert_eq!(mime_for_name("x.webm"), "video/webm");
    }

    #[test]
    fn test_asset_index_resolution() {
        let mut index = AssetIndex::new();
        index.insert(Asset::new("files/Sub/IMG_1.jpg", vec![1u8]));
        index.insert(Asset::new("other.png", vec![2u8]));

        assert_eq!(index.resolve("files/sub/img_1.jpg"), Some("files/sub/img_1.jpg"));
        assert_eq!(
            index.resolve("images/IMG_1.jpg"),
            Some("files/sub/img_1.jpg"),
            "Falls back to a file name match"
        );
        assert_eq!(index.resolve("OTHER.PNG"), Some("other.png"));
        assert_eq!(index.resolve("files/sub/img_1.jpg?v=2"), Some("files/sub/img_1.jpg"));
        assert_eq!(index.resolve("missing.jpg"), None);
        assert_eq!(index.resolve(""), None);
    }

    #[test]
    fn test_open_kmz_prefers_doc_kml() {
        let bytes = zip_bytes(&[
            ("a_first.kml", b"<kml>first</kml>"),
            ("sub/doc.kml", b"<kml>doc</kml>"),
            ("files/p.jpg", b"jpg"),
            ("files/v.mp4", b"mp4"),
            ("notes.txt", b"txt"),
        ]);
        let archive = open_kmz(&bytes, true).unwrap();
        assert_eq!(archive.kml_path, "sub/doc.kml");
        assert_eq!(archive.kml_text, "<kml>doc</kml>");
        assert_eq!(archive.assets.len(), 2, "Only image and video entries are indexed");

        let no_video = open_kmz(&bytes, false).unwrap();
        assert_eq!(no_video.assets.len(), 1);
    }

    #[test]
    fn test_open_kmz_falls_back_to_any_kml() {
        let bytes = zip_bytes(&[("x/Overlay.KML", b"<kml/>")]);
        let archive = open_kmz(&bytes, false).unwrap();
        assert_eq!(archive.kml_path, "x/Overlay.KML");
    }

    #[test]
    fn test_open_kmz_missing_document() {
        let bytes = zip_bytes(&[("files/p.jpg", b"jpg")]);
        let err = open_kmz(&bytes, true).unwrap_err();
        assert!(matches!(err, PhotoMapError::MissingPrimaryDocument));
    }

    #[test]
    fn test_open_kmz_unreadable() {
        let err = open_kmz(b"definitely not a zip", true).unwrap_err();
        assert!(matches!(err, PhotoMapError::ArchiveUnreadable(_)));
    }
}
