use thiserror::Error;

/// The primary error type for the photo-map crate.
#[derive(Error, Debug)]
pub enum PhotoMapError {
    // --- Structural failures: abort the import of one source document ---
    #[error("Malformed {format} input: {reason}")]
    MalformedInput {
        format: &'static str,
        reason: String,
    },

    #[error("Archive could not be opened: {0}")]
    ArchiveUnreadable(String),

    #[error("Archive contains no KML document")]
    MissingPrimaryDocument,

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    // --- Edit and alignment failures ---
    #[error("Coordinate out of range: lat {lat}, lng {lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("No time-stamped track samples are available for alignment")]
    NoTimedTracks,

    // --- Collaborator failures ---
    #[error("Image codec could not decode {name}: {reason}")]
    Codec { name: String, reason: String },

    // --- Wrapped library errors ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PhotoMapError {
    pub(crate) fn malformed(format: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            format,
            reason: reason.into(),
        }
    }
}

/// Why a single record (a placemark, a CSV row, a photo overlay) was left out of an import.
///
/// Skips never abort the surrounding document; they are collected next to the records that
/// did import so callers can report them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("no media reference (href) present")]
    MissingHref,

    #[error("no Point coordinates present")]
    MissingCoordinates,

    #[error("coordinates could not be parsed or are out of range: {0}")]
    InvalidCoordinates(String),

    #[error("media reference could not be resolved: {0}")]
    UnresolvedAssetReference(String),
}

/// A skipped record together with enough context to find it again in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    /// Element or record kind, e.g. `PhotoOverlay`, `Placemark`, `csv row 4`.
    pub record: String,
    /// The record's display name, when it had one.
    pub name: String,
    pub reason: SkipReason,
}

pub type Result<T> = std::result::Result<T, PhotoMapError>;
