//! File names for exported media that are safe on every desktop file system.
use crate::model::Photo;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

const MAX_NAME_LEN: usize = 180;

lazy_static! {
    static ref RESERVED_CHARS_RE: Regex = Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap();
    static ref DEVICE_NAME_RE: Regex =
        Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\..*)?$").unwrap();
}

/// Splits `name` into stem and extension (with its dot). A leading dot is part of the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => name.split_at(dot),
        _ => (name, ""),
    }
}

/// Makes a file name from an arbitrary photo name.
///
/// Directories are dropped, reserved and control characters become `_`, trailing dots and
/// spaces are trimmed and device names such as `CON` get a `_` prefix. Names without an
/// extension get `fallback_ext` (given with its dot). The result is at most 180 characters
/// and keeps its extension when shortened.
pub fn safe_file_name(raw: &str, fallback_ext: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let replaced = RESERVED_CHARS_RE.replace_all(base, "_");
    let mut name = replaced.trim_end_matches([' ', '.']).trim_end().to_string();
    if name.is_empty() {
        name = "file".to_string();
    }
    if DEVICE_NAME_RE.is_match(&name) {
        name.insert(0, '_');
    }
    if split_extension(&name).1.is_empty() {
        name.push_str(fallback_ext);
    }

    if name.chars().count() > MAX_NAME_LEN {
        let (stem, ext) = split_extension(&name);
        let keep = MAX_NAME_LEN.saturating_sub(ext.chars().count());
        let stem: String = stem.chars().take(keep).collect();
        name = format!("{stem}{ext}");
    }
    name
}

/// Hands out names that are unique ignoring case, appending `_1`, `_2`, ... to the stem.
#[derive(Debug, Default)]
pub struct AssetNamer {
    used: HashSet<String>,
}

impl AssetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: &str) -> String {
        let (stem, ext) = split_extension(name);
        let mut candidate = name.to_string();
        let mut counter = 1;
        while !self.used.insert(candidate.to_lowercase()) {
            candidate = format!("{stem}_{counter}{ext}");
            counter += 1;
        }
        candidate
    }
}

/// A photo's media under the name it gets inside an export.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PackedAsset<'a> {
    pub photo_id: &'a str,
    pub name: String,
    pub mime: &'a str,
    pub bytes: &'a [u8],
}

/// Names the media of every photo that has bytes, in photo order.
pub(crate) fn pack_assets<'a>(photos: impl IntoIterator<Item = &'a Photo>) -> Vec<PackedAsset<'a>> {
    let mut namer = AssetNamer::new();
    photos
        .into_iter()
        .filter_map(|photo| {
            let media = photo.media.as_ref()?;
            let bytes = media.bytes()?;
            let safe = safe_file_name(&photo.name, &extension_for_mime(media.mime()));
            Some(PackedAsset {
                photo_id: photo.id(),
                name: namer.claim(&safe),
                mime: media.mime(),
                bytes,
            })
        })
        .collect()
}

/// Extension (with dot) to fall back on for media of the given MIME type.
pub(crate) fn extension_for_mime(mime: &str) -> String {
    match mime {
        "image/jpeg" => ".jpg".to_string(),
        _ => mime_guess::get_mime_extensions_str(mime)
            .and_then(|exts| exts.first())
            .map_or_else(|| ".jpg".to_string(), |ext| format!(".{ext}")),
    }
}
