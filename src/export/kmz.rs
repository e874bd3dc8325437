use super::ExportOptions;
use super::kml::{KmlFlavor, write_kml};
use super::naming::pack_assets;
use crate::error::Result;
use crate::model::TrackCollection;
use crate::registry::PhotoRegistry;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const KMZ_MIME: &str = "application/vnd.google-earth.kmz";

/// Packs `doc.kml` and the media of every geolocated photo under `files/`.
///
/// Media entries are written first so readers that stream the archive see them before the
/// document that references them. With `include_media` off the archive holds only `doc.kml`.
pub fn write_kmz(registry: &PhotoRegistry, tracks: &TrackCollection, options: &ExportOptions) -> Result<Vec<u8>> {
    let assets = if options.include_media {
        pack_assets(registry.positioned())
    } else {
        Vec::new()
    };
    let names: HashMap<String, String> = assets
        .iter()
        .map(|asset| (asset.photo_id.to_string(), asset.name.clone()))
        .collect();

    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for asset in &assets {
        writer.start_file(format!("files/{}", asset.name), file_options)?;
        writer.write_all(asset.bytes)?;
    }
    let kml = write_kml(registry, tracks, options, KmlFlavor::Kmz(&names));
    writer.start_file("doc.kml", file_options)?;
    writer.write_all(kml.as_bytes())?;

    let bytes = writer.finish()?.into_inner();
    debug!("Wrote KMZ with {} media files, {} bytes", assets.len(), bytes.len());
    Ok(bytes)
}
