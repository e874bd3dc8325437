//! # Photo Map
//!
//! Put geotagged photos, 360° panoramas and drawn tracks on one map, edit them, and export
//! the result as KML, KMZ or a self-contained web page.
//!
//! ## Key Features
//!
//! - **Track Import**: GPX, KML, KMZ, GeoJSON and `lat,lng` CSV documents become a flat list
//!   of point, line and polygon features, with per-vertex times where the source has them.
//! - **Photo Extraction**: KML/KMZ `PhotoOverlay`s and photo placemarks (icon, description
//!   `<img>`/`<video>`, `ExtendedData`) are turned back into photos with their media.
//! - **Metadata**: GPS position, altitude, heading, GPano hints and a timezone-aware capture
//!   time are read from whatever tag mapping your metadata extractor returns.
//! - **Editing**: a photo registry with bulk tagging, time shifts, filters and delete
//!   notifications, plus alignment of dated photos onto timed tracks.
//! - **Export**: KML, KMZ with packed media, a portable site bundle and a single HTML page.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use photo_map::PhotoMap;
//! use std::path::Path;
//!
//! fn main() -> photo_map::Result<()> {
//!     let mut map = PhotoMap::builder().project_title("Alps 2024").build();
//!
//!     // Tracks and photos from an earlier session.
//!     map.import_file(Path::new("trip/route.gpx"))?;
//!     map.import_file(Path::new("trip/photos.kmz"))?;
//!
//!     // Move every dated photo onto the GPS track.
//!     let report = map.align_by_time()?;
//!     println!("Aligned {} photos", report.aligned.len());
//!
//!     std::fs::write("alps.kmz", map.export_kmz()?)?;
//!     map.export_site_bundle_to(Path::new("alps-site"))?;
//!     Ok(())
//! }
//! ```

pub mod align;
pub mod archive;
pub mod color;
pub mod error;
pub mod export;
pub mod extract;
pub mod geometry;
pub mod metadata;
pub mod model;
pub mod photo_map;
pub mod readers;
pub mod registry;
pub mod services;
pub mod time;
pub mod utils;

pub use error::{PhotoMapError, Result, SkipReason, Skipped};
pub use model::{Coord, Geometry, LatLng, MediaRef, Photo, PhotoKind, TrackCollection, TrackFeature, TrackStyle};
pub use photo_map::{ImportReport, PhotoMap};
pub use registry::{PhotoEdit, PhotoFilter, PhotoRegistry, RegistryListener};
pub use services::{DecodedImage, ImageCodec, MetadataExtractor};
