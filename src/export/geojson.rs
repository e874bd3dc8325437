use crate::model::{Coord, Geometry, TrackCollection, TrackFeature};
use crate::time::format_timestamp;
use serde_json::{Map, Value, json};

fn position(coord: &Coord) -> Value {
    match coord.alt {
        Some(alt) => json!([coord.lng, coord.lat, alt]),
        None => json!([coord.lng, coord.lat]),
    }
}

fn line(coords: &[Coord]) -> Value {
    Value::Array(coords.iter().map(position).collect())
}

fn rings(rings: &[Vec<Coord>]) -> Value {
    Value::Array(rings.iter().map(|ring| line(ring)).collect())
}

pub fn geometry_to_geojson(geometry: &Geometry) -> Value {
    let coordinates = match geometry {
        Geometry::Point(coord) => position(coord),
        Geometry::LineString(coords) => line(coords),
        Geometry::Polygon(polygon) | Geometry::MultiLineString(polygon) => rings(polygon),
        Geometry::MultiPolygon(polygons) => {
            Value::Array(polygons.iter().map(|polygon| rings(polygon)).collect())
        }
    };
    json!({ "type": geometry.type_name(), "coordinates": coordinates })
}

pub fn feature_to_geojson(feature: &TrackFeature) -> Value {
    let mut properties = Map::new();
    properties.insert("name".into(), Value::String(feature.name.clone()));
    if !feature.description.is_empty() {
        properties.insert("desc".into(), Value::String(feature.description.clone()));
    }
    if let Some(style) = feature.style.as_ref().filter(|s| !s.is_empty())
        && let Ok(style) = serde_json::to_value(style)
    {
        properties.insert("style".into(), style);
    }
    if let Some((_, times)) = feature.timed_line() {
        let times = times.iter().map(|t| Value::String(format_timestamp(t))).collect();
        properties.insert("coordTimes".into(), Value::Array(times));
    } else if let (Geometry::Point(_), Some([time])) = (&feature.geometry, feature.times.as_deref()) {
        properties.insert("time".into(), Value::String(format_timestamp(time)));
    }

    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": geometry_to_geojson(&feature.geometry),
    })
}

/// Serializes the tracks as a GeoJSON `FeatureCollection` that
/// [`read_geojson_value`](crate::readers::read_geojson_value) reads back.
pub fn tracks_to_geojson(tracks: &TrackCollection) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": tracks.iter().map(feature_to_geojson).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackStyle;
    use crate::readers::read_geojson_value;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_feature_properties() {
        let mut walk = TrackFeature::new(
            "walk",
            Geometry::LineString(vec![Coord::new(4.0, 52.0), Coord::with_alt(4.1, 52.1, Some(3.5))]),
        );
        walk.style = Some(TrackStyle {
            color: Some("#ff0000".to_string()),
            fill_opacity: Some(0.5),
            ..TrackStyle::default()
        });
        walk.times = Some(vec![
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 1, 0).unwrap(),
        ]);

        let value = feature_to_geojson(&walk);
        assert_eq!(value["geometry"]["coordinates"][1], json!([4.1, 52.1, 3.5]));
        assert_eq!(
            value["properties"]["style"],
            json!({ "color": "#ff0000", "fillOpacity": 0.5 })
        );
        assert_eq!(value["properties"]["coordTimes"][0], "2024-05-01T08:00:00.000Z");
        assert!(value["properties"].get("desc").is_none());
    }

    #[test]
    fn test_collection_reads_back() {
        let mut spot = TrackFeature::new("spot", Geometry::Point(Coord::new(121.5, 25.0)));
        spot.description = "lookout".to_string();
        spot.times = Some(vec![Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()]);
        let park = TrackFeature::new(
            "park",
            Geometry::MultiPolygon(vec![vec![vec![
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(1.0, 1.0),
                Coord::new(0.0, 0.0),
            ]]]),
        );
        let tracks = TrackCollection::from(vec![spot, park]);

        let back = read_geojson_value(&tracks_to_geojson(&tracks)).unwrap();
        assert_eq!(back, tracks);
    }
}
