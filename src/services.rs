//! Collaborators the core talks to but does not implement: image decoding and tag extraction.
use crate::error::Result;
use serde_json::Value;

/// What the image codec reports about a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Displayable bytes when the codec had to transcode the input (e.g. HEIC to JPEG).
    /// `None` means the input bytes are displayable as they are.
    pub display_bytes: Option<Vec<u8>>,
    /// MIME type of `display_bytes`.
    pub display_mime: Option<String>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            display_bytes: None,
            display_mime: None,
        }
    }
}

/// Decodes image bytes far enough to know their pixel size.
pub trait ImageCodec: Send + Sync {
    /// `name` is the original file name, for extension based format detection.
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<DecodedImage>;
}

/// Extracts embedded metadata (EXIF, XMP, GPS) as a tag mapping.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, name: &str, bytes: &[u8]) -> Result<Value>;
}
