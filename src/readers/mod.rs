//! Track readers. Each turns one source document into a [`TrackCollection`].
pub mod csv;
pub mod geojson;
pub mod gpx;
pub mod kml;
pub(crate) mod xml;

use crate::archive::{extension_of, open_kmz};
use crate::error::{PhotoMapError, Result};
use crate::model::TrackCollection;

pub use csv::read_csv;
pub use geojson::{read_geojson, read_geojson_value};
pub use gpx::read_gpx;
pub use kml::read_kml;

/// Document formats recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Gpx,
    Kml,
    Kmz,
    GeoJson,
    Csv,
}

impl DocumentFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match extension_of(name)?.as_str() {
            "gpx" => Some(DocumentFormat::Gpx),
            "kml" => Some(DocumentFormat::Kml),
            "kmz" => Some(DocumentFormat::Kmz),
            "geojson" | "json" => Some(DocumentFormat::GeoJson),
            "csv" => Some(DocumentFormat::Csv),
            _ => None,
        }
    }
}

/// Source text with a leading byte order mark removed.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_start_matches('\u{feff}')
        .to_string()
}

/// Reads the tracks of a document, choosing the reader by extension.
///
/// For a KMZ only the geometry of its KML is returned; photos inside the archive are
/// imported through [`crate::PhotoMap::import_document`].
pub fn read_track_file(name: &str, bytes: &[u8]) -> Result<TrackCollection> {
    let format = DocumentFormat::from_name(name)
        .ok_or_else(|| PhotoMapError::UnsupportedFormat(name.to_string()))?;
    match format {
        DocumentFormat::Gpx => read_gpx(&decode_text(bytes)),
        DocumentFormat::Kml => read_kml(&decode_text(bytes)),
        DocumentFormat::Kmz => read_kml(&open_kmz(bytes, true)?.kml_text),
        DocumentFormat::GeoJson => read_geojson(&decode_text(bytes)),
        DocumentFormat::Csv => read_csv(&decode_text(bytes)),
    }
}
