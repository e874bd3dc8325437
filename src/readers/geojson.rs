use crate::error::{PhotoMapError, Result};
use crate::model::{Coord, Geometry, TrackCollection, TrackFeature, TrackStyle};
use crate::time::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

const FORMAT: &str = "GeoJSON";

fn malformed(reason: impl Into<String>) -> PhotoMapError {
    PhotoMapError::malformed(FORMAT, reason)
}

/// Reads a GeoJSON text. See [`read_geojson_value`].
pub fn read_geojson(text: &str) -> Result<TrackCollection> {
    let value: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    read_geojson_value(&value)
}

/// Reads a `FeatureCollection`, a single `Feature` or a bare geometry.
///
/// Any other top-level `type`, or a coordinate that is not a number, fails the whole
/// document. Features with a `null` geometry are skipped. `MultiPoint` and
/// `GeometryCollection` are split into one feature per member.
pub fn read_geojson_value(value: &Value) -> Result<TrackCollection> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("top-level object has no \"type\""))?;

    let mut tracks = TrackCollection::new();
    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("FeatureCollection without a \"features\" array"))?;
            for feature in features {
                read_feature(feature, &mut tracks)?;
            }
        }
        "Feature" => read_feature(value, &mut tracks)?,
        _ if is_geometry_type(kind) => {
            for geometry in read_geometry(value)? {
                tracks.push(TrackFeature::new(String::new(), geometry));
            }
        }
        other => return Err(malformed(format!("unsupported top-level type \"{other}\""))),
    }
    Ok(tracks)
}

fn is_geometry_type(kind: &str) -> bool {
    matches!(
        kind,
        "Point"
            | "MultiPoint"
            | "LineString"
            | "MultiLineString"
            | "Polygon"
            | "MultiPolygon"
            | "GeometryCollection"
    )
}

fn read_feature(feature: &Value, tracks: &mut TrackCollection) -> Result<()> {
    if feature.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(malformed("FeatureCollection member is not a Feature"));
    }
    let geometry = match feature.get("geometry") {
        None | Some(Value::Null) => return Ok(()),
        Some(geometry) => geometry,
    };
    let empty = Map::new();
    let properties = feature
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let name = match properties.get("name") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let description = ["desc", "description"]
        .iter()
        .find_map(|key| properties.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let style = properties
        .get("style")
        .and_then(|s| serde_json::from_value::<TrackStyle>(s.clone()).ok())
        .filter(|s| !s.is_empty());

    for geometry in read_geometry(geometry)? {
        let times = read_times(properties, &geometry);
        tracks.push(TrackFeature {
            name: name.clone(),
            description: description.clone(),
            geometry,
            times,
            style: style.clone(),
        });
    }
    Ok(())
}

/// `coordTimes` for a LineString (one per vertex), `time` for a Point.
fn read_times(properties: &Map<String, Value>, geometry: &Geometry) -> Option<Vec<DateTime<Utc>>> {
    match geometry {
        Geometry::LineString(line) => {
            let times = properties
                .get("coordTimes")?
                .as_array()?
                .iter()
                .map(|t| t.as_str().and_then(parse_timestamp))
                .collect::<Option<Vec<_>>>()?;
            (times.len() == line.len()).then_some(times)
        }
        Geometry::Point(_) => {
            let time = properties.get("time").and_then(Value::as_str).and_then(parse_timestamp)?;
            Some(vec![time])
        }
        _ => None,
    }
}

fn read_geometry(geometry: &Value) -> Result<Vec<Geometry>> {
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("geometry without a \"type\""))?;

    if kind == "GeometryCollection" {
        let members = geometry
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("GeometryCollection without \"geometries\""))?;
        let mut out = Vec::new();
        for member in members {
            out.extend(read_geometry(member)?);
        }
        return Ok(out);
    }

    let coordinates = geometry
        .get("coordinates")
        .ok_or_else(|| malformed(format!("{kind} without \"coordinates\"")))?;

    let parsed = match kind {
        "Point" => vec![Geometry::Point(position(coordinates)?)],
        "MultiPoint" => positions(coordinates)?
            .into_iter()
            .map(Geometry::Point)
            .collect(),
        "LineString" => vec![Geometry::LineString(positions(coordinates)?)],
        "MultiLineString" => vec![Geometry::MultiLineString(rings(coordinates)?)],
        "Polygon" => vec![Geometry::Polygon(rings(coordinates)?)],
        "MultiPolygon" => {
            let polygons = array(coordinates)?
                .iter()
                .map(rings)
                .collect::<Result<Vec<_>>>()?;
            vec![Geometry::MultiPolygon(polygons)]
        }
        other => return Err(malformed(format!("unsupported geometry type \"{other}\""))),
    };
    Ok(parsed)
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| malformed("coordinates must be arrays"))
}

fn position(value: &Value) -> Result<Coord> {
    let items = array(value)?;
    if items.len() < 2 {
        return Err(malformed("a position needs at least two numbers"));
    }
    let number = |v: &Value| {
        v.as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| malformed(format!("coordinate {v} is not a number")))
    };
    let lng = number(&items[0])?;
    let lat = number(&items[1])?;
    let alt = items.get(2).map(number).transpose()?;
    Ok(Coord::with_alt(lng, lat, alt))
}

fn positions(value: &Value) -> Result<Vec<Coord>> {
    array(value)?.iter().map(position).collect()
}

fn rings(value: &Value) -> Result<Vec<Vec<Coord>>> {
    array(value)?.iter().map(positions).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_feature_collection_with_properties() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "A", "desc": "first" },
                    "geometry": { "type": "Point", "coordinates": [121.5, 25.0] }
                },
                {
                    "type": "Feature",
                    "properties": {
                        "name": "walk",
                        "style": { "color": "#ff0000", "weight": 3, "fillOpacity": 0.4 },
                        "coordTimes": ["2024-05-01T08:00:00Z", "2024-05-01T08:05:00Z"]
                    },
                    "geometry": { "type": "LineString", "coordinates": [[0, 0, 5], [1, 1, 6]] }
                },
                { "type": "Feature", "properties": {}, "geometry": null }
            ]
        });
        let tracks = read_geojson_value(&value).unwrap();
        assert_eq!(tracks.len(), 2, "Null geometry is skipped");

        let a = &tracks.features()[0];
        assert_eq!(a.name, "A");
        assert_eq!(a.description, "first");
        assert_eq!(a.geometry, Geometry::Point(Coord::new(121.5, 25.0)));

        let walk = &tracks.features()[1];
        let style = walk.style.as_ref().unwrap();
        assert_eq!(style.color.as_deref(), Some("#ff0000"));
        assert_eq!(style.weight, Some(3.0));
        let (_, times) = walk.timed_line().expect("coordTimes match the vertices");
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 5, 1, 8, 5, 0).unwrap());
    }

    #[test]
    fn test_bare_geometry_and_collections() {
        let tracks = read_geojson(r#"{"type":"MultiPoint","coordinates":[[1,2],[3,4]]}"#).unwrap();
        assert_eq!(tracks.len(), 2);

        let tracks = read_geojson(
            r#"{"type":"GeometryCollection","geometries":[
                {"type":"Point","coordinates":[1,2]},
                {"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(matches!(tracks.features()[1].geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_rejects_unknown_top_level_type() {
        let err = read_geojson(r#"{"type":"Topology","objects":{}}"#).unwrap_err();
        assert!(matches!(err, PhotoMapError::MalformedInput { format: "GeoJSON", .. }));
    }

    #[test]
    fn test_rejects_non_numeric_coordinates() {
        let err = read_geojson(
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":["1","2"]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a number"), "Got: {err}");
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            read_geojson("{ nope").unwrap_err(),
            PhotoMapError::MalformedInput { .. }
        ));
    }
}
