use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STROKE_COLOR: &str = "#4da3ff";
pub const DEFAULT_STROKE_WEIGHT: f64 = 2.0;
pub const DEFAULT_FILL_OPACITY: f64 = 0.25;

/// A single vertex, longitude first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lng: f64,
    pub lat: f64,
    pub alt: Option<f64>,
}

impl Coord {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat, alt: None }
    }

    pub fn with_alt(lng: f64, lat: f64, alt: Option<f64>) -> Self {
        Self { lng, lat, alt }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    /// Outer ring first, then holes.
    Polygon(Vec<Vec<Coord>>),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
}

impl Geometry {
    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Number of vertices, summed over every part.
    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::LineString(line) => line.len(),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().map(Vec::len).sum()
            }
            Geometry::MultiPolygon(polygons) => polygons.iter().flatten().map(Vec::len).sum(),
        }
    }
}

/// Stroke and fill of a drawn feature. Every field is optional; see the `*_or_default` getters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
}

impl TrackStyle {
    pub fn color_or_default(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_STROKE_COLOR)
    }

    pub fn weight_or_default(&self) -> f64 {
        self.weight.unwrap_or(DEFAULT_STROKE_WEIGHT)
    }

    /// Falls back to the stroke color.
    pub fn fill_color_or_default(&self) -> &str {
        self.fill_color
            .as_deref()
            .unwrap_or_else(|| self.color_or_default())
    }

    pub fn fill_opacity_or_default(&self) -> f64 {
        self.fill_opacity.unwrap_or(DEFAULT_FILL_OPACITY)
    }

    pub fn is_empty(&self) -> bool {
        self == &TrackStyle::default()
    }
}

/// One drawn geometry with its label, optional per-vertex times and optional style.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFeature {
    pub name: String,
    pub description: String,
    pub geometry: Geometry,
    /// One timestamp per LineString vertex.
    pub times: Option<Vec<DateTime<Utc>>>,
    pub style: Option<TrackStyle>,
}

impl TrackFeature {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            geometry,
            times: None,
            style: None,
        }
    }

    /// The times, but only when they pair up with the vertices of a LineString.
    pub fn timed_line(&self) -> Option<(&[Coord], &[DateTime<Utc>])> {
        match (&self.geometry, &self.times) {
            (Geometry::LineString(line), Some(times)) if line.len() == times.len() => {
                Some((line, times))
            }
            _ => None,
        }
    }
}

/// Insertion-ordered bag of track features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCollection {
    features: Vec<TrackFeature>,
}

impl TrackCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: TrackFeature) {
        self.features.push(feature);
    }

    pub fn extend(&mut self, other: TrackCollection) {
        self.features.extend(other.features);
    }

    pub fn features(&self) -> &[TrackFeature] {
        &self.features
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackFeature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn clear(&mut self) {
        self.features.clear();
    }
}

impl From<Vec<TrackFeature>> for TrackCollection {
    fn from(features: Vec<TrackFeature>) -> Self {
        Self { features }
    }
}

impl<'a> IntoIterator for &'a TrackCollection {
    type Item = &'a TrackFeature;
    type IntoIter = std::slice::Iter<'a, TrackFeature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_style_defaults() {
        let style = TrackStyle::default();
        assert_eq!(style.color_or_default(), "#4da3ff");
        assert_eq!(style.fill_color_or_default(), "#4da3ff");
        assert_eq!(style.weight_or_default(), 2.0);
        assert_eq!(style.fill_opacity_or_default(), 0.25);

        let red = TrackStyle {
            color: Some("#ff0000".into()),
            ..Default::default()
        };
        assert_eq!(red.fill_color_or_default(), "#ff0000");
    }

    #[test]
    fn test_style_serializes_camel_case() {
        let style = TrackStyle {
            fill_color: Some("#00ff00".into()),
            fill_opacity: Some(0.5),
            ..Default::default()
        };
        let value = serde_json::to_value(&style).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"fillColor": "#00ff00", "fillOpacity": 0.5})
        );
    }

    #[test]
    fn test_timed_line_requires_matching_lengths() {
        let t0 = Utc.timestamp_opt(0, 0).unwrap();
        let mut feature = TrackFeature::new(
            "walk",
            Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)]),
        );
        assert!(feature.timed_line().is_none());

        feature.times = Some(vec![t0]);
        assert!(feature.timed_line().is_none(), "Length mismatch is ignored");

        feature.times = Some(vec![t0, t0]);
        assert!(feature.timed_line().is_some());
    }

    #[test]
    fn test_vertex_count() {
        let square = vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ];
        assert_eq!(Geometry::Polygon(vec![square.clone()]).vertex_count(), 4);
        assert_eq!(
            Geometry::MultiPolygon(vec![vec![square.clone()], vec![square]]).vertex_count(),
            8
        );
    }
}
