use crate::archive::{is_image_name, is_video_name};
use crate::error::Result;
use crate::readers::DocumentFormat;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Checks if a directory entry is hidden (starts with '.').
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.'))
}

/// True for files `PhotoMap::import_file` understands: track documents, KMZ archives,
/// images and videos.
pub fn is_importable_name(name: &str) -> bool {
    DocumentFormat::from_name(name).is_some() || is_image_name(name) || is_video_name(name)
}

/// Recursively lists importable files below `dir`, sorted by path.
///
/// Hidden files and folders are skipped unless `include_hidden` is set; `dir` itself is
/// always walked. Traversal errors are returned, not skipped.
pub fn list_importable_files(dir: &Path, include_hidden: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_importable_name(&entry.file_name().to_string_lossy()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
