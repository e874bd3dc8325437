//! The in-memory model: photos and drawn track features.
mod photo;
mod track;

pub use photo::{
    LatLng, MediaRef, Photo, PhotoKind, generate_photo_id, is_panorama_by_size,
};
pub use track::{
    Coord, DEFAULT_FILL_OPACITY, DEFAULT_STROKE_COLOR, DEFAULT_STROKE_WEIGHT, Geometry,
    TrackCollection, TrackFeature, TrackStyle,
};
