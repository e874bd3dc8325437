use crate::align::{AlignmentReport, align_photos};
use crate::archive::{AssetIndex, is_image_name, is_video_name, mime_for_name, open_kmz};
use crate::error::{PhotoMapError, Result, Skipped};
use crate::export::{
    DEFAULT_COORDINATE_PRECISION, DEFAULT_PROJECT_TITLE, ExportOptions, KmlFlavor, ProjectPayload,
    SiteBundle, SiteContent, ViewerLibraries, build_site_bundle, read_site_bundle_dir,
    read_site_bundle_zip, write_kml, write_kmz, write_single_html,
};
use crate::extract::extract_photos;
use crate::geometry::field_of_view_polygon;
use crate::metadata::read_photo_metadata;
use crate::model::{MediaRef, Photo, TrackCollection};
use crate::readers::kml::read_kml_tracks;
use crate::readers::xml::parse_document;
use crate::readers::{DocumentFormat, decode_text, read_csv, read_geojson, read_gpx};
use crate::registry::{PhotoEdit, PhotoRegistry, RegistryListener};
use crate::services::{ImageCodec, MetadataExtractor};
use crate::utils::list_importable_files;
use bon::bon;
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one source document added to the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// File name the document was imported under.
    pub source: String,
    /// Track features added.
    pub features: usize,
    /// Ids of the photos added, in document order.
    pub photo_ids: Vec<String>,
    /// Records left out, with the reason.
    pub skipped: Vec<Skipped>,
}

/// A parsed document that has not touched the session yet.
#[derive(Debug, Default)]
struct ParsedDocument {
    tracks: TrackCollection,
    photos: Vec<Photo>,
    skipped: Vec<Skipped>,
}

/// The parts of the session a parse needs. Cheap to clone and `'static`, so a parse can
/// run on a rayon or tokio worker.
#[derive(Clone)]
struct DocumentParser {
    image_codec: Option<Arc<dyn ImageCodec>>,
    metadata_extractor: Option<Arc<dyn MetadataExtractor>>,
    include_videos: bool,
}

impl DocumentParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        match DocumentFormat::from_name(name) {
            Some(format) => self.parse_format(format, bytes),
            None if is_image_name(name) || (self.include_videos && is_video_name(name)) => {
                Ok(ParsedDocument {
                    photos: vec![self.photo_from_bytes(name, bytes)?],
                    ..ParsedDocument::default()
                })
            }
            None => Err(PhotoMapError::UnsupportedFormat(name.to_string())),
        }
    }

    fn parse_format(&self, format: DocumentFormat, bytes: &[u8]) -> Result<ParsedDocument> {
        let tracks_only = |tracks| ParsedDocument {
            tracks,
            ..ParsedDocument::default()
        };
        match format {
            DocumentFormat::Gpx => read_gpx(&decode_text(bytes)).map(tracks_only),
            DocumentFormat::GeoJson => read_geojson(&decode_text(bytes)).map(tracks_only),
            DocumentFormat::Csv => read_csv(&decode_text(bytes)).map(tracks_only),
            DocumentFormat::Kml => self.parse_kml(&decode_text(bytes), &Arc::new(AssetIndex::new())),
            DocumentFormat::Kmz => {
                let archive = open_kmz(bytes, self.include_videos)?;
                debug!(
                    "Opened KMZ: {} with {} media files",
                    archive.kml_path,
                    archive.assets.len()
                );
                self.parse_kml(&archive.kml_text, &archive.assets)
            }
        }
    }

    /// Photos first; the geometry reader then skips the placemarks that became photos.
    fn parse_kml(&self, text: &str, assets: &Arc<AssetIndex>) -> Result<ParsedDocument> {
        let doc = parse_document(text)?;
        let extraction = extract_photos(&doc, assets, self.image_codec.as_deref());
        let tracks = read_kml_tracks(&doc, &extraction.consumed)?;
        Ok(ParsedDocument {
            tracks,
            photos: extraction.photos,
            skipped: extraction.skipped,
        })
    }

    /// Builds a photo from a dropped image or video file.
    fn photo_from_bytes(&self, name: &str, bytes: &[u8]) -> Result<Photo> {
        let mime = mime_for_name(name);
        let is_video = mime.starts_with("video/");

        let mut media = MediaRef::inline(bytes.to_vec(), mime);
        let (mut width, mut height) = (0, 0);
        if let Some(codec) = self.image_codec.as_deref().filter(|_| !is_video) {
            let decoded = codec.decode(name, bytes)?;
            width = decoded.width;
            height = decoded.height;
            if let (Some(display), Some(display_mime)) = (decoded.display_bytes, decoded.display_mime) {
                media = MediaRef::inline(display, display_mime);
            }
        }

        let tags = match self.metadata_extractor.as_deref() {
            Some(extractor) => extractor.extract(name, bytes).unwrap_or_else(|e| {
                warn!("Could not read metadata of {name}: {e}");
                Value::Null
            }),
            None => Value::Null,
        };
        let metadata = read_photo_metadata(name, &tags);

        Ok(Photo::builder()
            .name(name)
            .media(media)
            .width(width)
            .height(height)
            .maybe_position(metadata.position())
            .maybe_altitude(metadata.gps.as_ref().and_then(|gps| gps.altitude))
            .panorama_hint(metadata.pano.panorama_hint)
            .yaw(metadata.pano.pose_heading.unwrap_or(0.0))
            .maybe_bearing(metadata.heading)
            .maybe_captured_at(metadata.captured.map(|c| c.utc))
            .build())
    }
}

/// One editing session: the photos, the tracks and the collaborators used to import them.
///
/// ```rust
/// # use photo_map::PhotoMap;
/// let mut map = PhotoMap::builder().project_title("Coast walk").build();
/// let report = map
///     .import_document("points.csv", b"lat,lng,name\n52.1,4.3,Pier\n")
///     .unwrap();
/// assert_eq!(report.features, 1);
/// let kml = map.export_kml();
/// assert!(kml.contains("<name>Pier</name>"));
/// ```
pub struct PhotoMap {
    registry: PhotoRegistry,
    tracks: TrackCollection,
    parser: DocumentParser,
    project_title: String,
    coordinate_precision: u32,
    fov_degrees: f64,
    fov_distance_m: f64,
    viewer_libraries: ViewerLibraries,
}

#[bon]
impl PhotoMap {
    /// Creates an empty session.
    ///
    /// # Builder Arguments
    ///
    /// * `project_title` - (Default: `"My 360 Map"`) Title written into every export.
    /// * `coordinate_precision` - (Default: `5`) Decimal places kept for photo coordinates on export.
    /// * `fov_degrees` - (Default: `60.0`) Opening angle of the field-of-view cone.
    /// * `fov_distance_m` - (Default: `80.0`) Length of the field-of-view cone in metres.
    /// * `include_videos` - (Default: `true`) Import mp4/m4v/mov/webm files and archive entries.
    /// * `image_codec` - Measures images. Without one, pixel sizes are 0 unless a document
    ///   stores them.
    /// * `metadata_extractor` - Reads EXIF/XMP tags of added photos. Without one, added photos
    ///   carry no position or capture time.
    /// * `viewer_libraries` - (Default: CDN) Where the site bundle's page loads its scripts from.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_PROJECT_TITLE.to_string(), into)] project_title: String,
        #[builder(default = DEFAULT_COORDINATE_PRECISION)] coordinate_precision: u32,
        #[builder(default = 60.0)] fov_degrees: f64,
        #[builder(default = 80.0)] fov_distance_m: f64,
        #[builder(default = true)] include_videos: bool,
        image_codec: Option<Arc<dyn ImageCodec>>,
        metadata_extractor: Option<Arc<dyn MetadataExtractor>>,
        #[builder(default)] viewer_libraries: ViewerLibraries,
    ) -> Self {
        Self {
            registry: PhotoRegistry::new(),
            tracks: TrackCollection::new(),
            parser: DocumentParser {
                image_codec,
                metadata_extractor,
                include_videos,
            },
            project_title,
            coordinate_precision,
            fov_degrees,
            fov_distance_m,
            viewer_libraries,
        }
    }
}

impl PhotoMap {
    pub fn registry(&self) -> &PhotoRegistry {
        &self.registry
    }

    pub fn tracks(&self) -> &TrackCollection {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut TrackCollection {
        &mut self.tracks
    }

    pub fn project_title(&self) -> &str {
        &self.project_title
    }

    pub fn set_project_title(&mut self, title: impl Into<String>) {
        self.project_title = title.into();
    }

    /// Registers a listener for photo removals.
    pub fn subscribe(&mut self, listener: Arc<dyn RegistryListener>) {
        self.registry.subscribe(listener);
    }

    fn apply(&mut self, source: &str, parsed: ParsedDocument) -> ImportReport {
        let features = parsed.tracks.len();
        self.tracks.extend(parsed.tracks);
        let photo_ids: Vec<String> = parsed
            .photos
            .into_iter()
            .map(|photo| self.registry.insert(photo))
            .collect();
        for skipped in &parsed.skipped {
            debug!("{source}: skipped {} \"{}\": {}", skipped.record, skipped.name, skipped.reason);
        }
        info!(
            "Imported {source}: {features} features, {} photos, {} skipped",
            photo_ids.len(),
            parsed.skipped.len()
        );
        ImportReport {
            source: source.to_string(),
            features,
            photo_ids,
            skipped: parsed.skipped,
        }
    }

    /// Adds a single image or video. Returns the new photo's id.
    ///
    /// The codec, when configured, supplies the pixel size (and display bytes for formats
    /// that need transcoding); the metadata extractor supplies position, capture time,
    /// heading and panorama hints. A codec failure fails the add.
    pub fn add_photo(&mut self, name: &str, bytes: &[u8]) -> Result<String> {
        let photo = self.parser.photo_from_bytes(name, bytes)?;
        Ok(self.registry.insert(photo))
    }

    /// Imports one document, choosing the reader by file extension. Images and videos are
    /// added as photos.
    ///
    /// The session is only changed when the whole document parsed; a structural failure
    /// leaves photos and tracks as they were.
    pub fn import_document(&mut self, name: &str, bytes: &[u8]) -> Result<ImportReport> {
        let parsed = self.parser.parse(name, bytes)?;
        Ok(self.apply(name, parsed))
    }

    /// Imports a KMZ regardless of its file name.
    pub fn import_kmz(&mut self, bytes: &[u8]) -> Result<ImportReport> {
        let parsed = self.parser.parse_format(DocumentFormat::Kmz, bytes)?;
        Ok(self.apply("doc.kmz", parsed))
    }

    /// Imports several documents. Parsing runs in parallel; the results are applied in input
    /// order, so ids and track order do not depend on scheduling. A failing document does not
    /// affect the others.
    pub fn import_batch<N, B>(&mut self, documents: &[(N, B)]) -> Vec<Result<ImportReport>>
    where
        N: AsRef<str> + Sync,
        B: AsRef<[u8]> + Sync,
    {
        let parser = &self.parser;
        let parsed: Vec<Result<ParsedDocument>> = documents
            .par_iter()
            .map(|(name, bytes)| parser.parse(name.as_ref(), bytes.as_ref()))
            .collect();

        documents
            .iter()
            .zip(parsed)
            .map(|((name, _), result)| match result {
                Ok(parsed) => Ok(self.apply(name.as_ref(), parsed)),
                Err(e) => {
                    warn!("Failed to import {}: {e}", name.as_ref());
                    Err(e)
                }
            })
            .collect()
    }

    /// Reads and imports a file from disk.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportReport> {
        let bytes = fs::read(path)?;
        self.import_document(&file_name(path), &bytes)
    }

    /// Like [`import_file`](Self::import_file), with the read and parse on tokio's blocking pool.
    pub async fn import_file_async(&mut self, path: PathBuf) -> Result<ImportReport> {
        let parser = self.parser.clone();
        let name = file_name(&path);
        let task_name = name.clone();
        let parsed = tokio::task::spawn_blocking(move || {
            let bytes = fs::read(&path)?;
            parser.parse(&task_name, &bytes)
        })
        .await??;
        Ok(self.apply(&name, parsed))
    }

    /// Imports every importable file below `dir`, in path order.
    pub fn import_directory(
        &mut self,
        dir: &Path,
        include_hidden: bool,
    ) -> Result<Vec<(PathBuf, Result<ImportReport>)>> {
        let paths = list_importable_files(dir, include_hidden)?;
        let mut readable = Vec::new();
        let mut results = Vec::new();
        for path in paths {
            match fs::read(&path) {
                Ok(bytes) => readable.push((path, bytes)),
                Err(e) => results.push((path, Err(e.into()))),
            }
        }
        let documents: Vec<(String, &[u8])> = readable
            .iter()
            .map(|(path, bytes)| (file_name(path), bytes.as_slice()))
            .collect();
        let reports = self.import_batch(&documents);
        results.extend(readable.into_iter().map(|(path, _)| path).zip(reports));
        Ok(results)
    }

    fn apply_site(&mut self, source: &str, content: SiteContent) -> ImportReport {
        self.apply(
            source,
            ParsedDocument {
                tracks: content.tracks,
                photos: content.photos,
                skipped: Vec::new(),
            },
        )
    }

    /// Imports a site bundle folder written by [`export_site_bundle`](Self::export_site_bundle).
    pub fn import_site_bundle(&mut self, dir: &Path) -> Result<ImportReport> {
        let content = read_site_bundle_dir(dir)?;
        Ok(self.apply_site(&file_name(dir), content))
    }

    /// Imports a zipped site bundle, or a zip holding a single exported page.
    pub fn import_site_bundle_zip(&mut self, bytes: &[u8]) -> Result<ImportReport> {
        let content = read_site_bundle_zip(bytes)?;
        Ok(self.apply_site("site.zip", content))
    }

    /// Applies an edit. Returns `false` for an unknown id.
    pub fn edit(&mut self, id: &str, edit: &PhotoEdit) -> Result<bool> {
        self.registry.update(id, edit)
    }

    pub fn set_position(&mut self, id: &str, lat: f64, lng: f64) -> Result<bool> {
        self.registry.set_position(id, lat, lng)
    }

    pub fn delete(&mut self, id: &str) -> Option<Photo> {
        self.registry.delete(id)
    }

    /// Places every dated photo on the nearest timed track sample.
    pub fn align_by_time(&mut self) -> Result<AlignmentReport> {
        align_photos(&mut self.registry, &self.tracks)
    }

    /// The view cone of a photo as `(lat, lng)` corners, when it has a position and bearing.
    pub fn field_of_view(&self, id: &str) -> Option<[(f64, f64); 4]> {
        let photo = self.registry.get(id)?;
        let position = photo.position()?;
        let bearing = photo.bearing()?;
        Some(field_of_view_polygon(
            position.lat(),
            position.lng(),
            bearing,
            self.fov_degrees,
            self.fov_distance_m,
        ))
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions::builder()
            .project_title(self.project_title.clone())
            .coordinate_precision(self.coordinate_precision)
            .build()
    }

    pub fn payload(&self) -> ProjectPayload {
        ProjectPayload::build(&self.registry, &self.tracks, &self.export_options())
    }

    /// A KML document of the geolocated photos and all tracks. Media is not included.
    pub fn export_kml(&self) -> String {
        write_kml(&self.registry, &self.tracks, &self.export_options(), KmlFlavor::Plain)
    }

    pub fn export_kmz(&self) -> Result<Vec<u8>> {
        write_kmz(&self.registry, &self.tracks, &self.export_options())
    }

    /// Builds the KMZ on tokio's blocking pool from a snapshot of the session.
    pub async fn export_kmz_async(&self) -> Result<Vec<u8>> {
        let registry = self.registry.snapshot();
        let tracks = self.tracks.clone();
        let options = self.export_options();
        tokio::task::spawn_blocking(move || write_kmz(&registry, &tracks, &options)).await?
    }

    pub fn export_site_bundle(&self) -> Result<SiteBundle> {
        build_site_bundle(
            &self.registry,
            &self.tracks,
            &self.export_options(),
            &self.viewer_libraries,
        )
    }

    /// Writes the site bundle into `dir`.
    pub fn export_site_bundle_to(&self, dir: &Path) -> Result<()> {
        self.export_site_bundle()?.write_to_dir(dir)
    }

    pub fn export_single_html(&self) -> Result<String> {
        write_single_html(&self.registry, &self.tracks, &self.export_options())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
