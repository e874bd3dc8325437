use super::xml::{child_text, children, is, parse_document};
use crate::error::{PhotoMapError, Result};
use crate::model::{Coord, Geometry, TrackCollection, TrackFeature};
use crate::time::parse_timestamp;
use chrono::{DateTime, Utc};
use roxmltree::Node;

/// Reads waypoints, routes and track segments from a GPX 1.0/1.1 document.
///
/// Waypoints become Points, each route and each track segment a LineString. A line carries
/// `times` only when every one of its points has a parseable `<time>`.
pub fn read_gpx(text: &str) -> Result<TrackCollection> {
    let doc = parse_document(text)?;
    let root = doc.root_element();
    if !is(root, "gpx") {
        return Err(PhotoMapError::malformed(
            "GPX",
            format!("root element is <{}>, expected <gpx>", root.tag_name().name()),
        ));
    }

    let mut tracks = TrackCollection::new();

    for wpt in children(root, "wpt") {
        if let Some((coord, time)) = read_point(wpt) {
            let mut feature = TrackFeature::new(
                child_text(wpt, "name").unwrap_or_default(),
                Geometry::Point(coord),
            );
            feature.description = describe(wpt);
            feature.times = time.map(|t| vec![t]);
            tracks.push(feature);
        }
    }

    for rte in children(root, "rte") {
        if let Some(feature) = read_line(rte, children(rte, "rtept")) {
            tracks.push(feature);
        }
    }

    for trk in children(root, "trk") {
        for seg in children(trk, "trkseg") {
            if let Some(feature) = read_line(trk, children(seg, "trkpt")) {
                tracks.push(feature);
            }
        }
    }

    Ok(tracks)
}

fn read_line<'a, 'i: 'a>(
    owner: Node<'a, 'i>,
    points: impl Iterator<Item = Node<'a, 'i>>,
) -> Option<TrackFeature> {
    let (coords, times): (Vec<Coord>, Vec<Option<DateTime<Utc>>>) =
        points.filter_map(read_point).unzip();
    if coords.is_empty() {
        return None;
    }
    let times: Option<Vec<DateTime<Utc>>> = times.into_iter().collect();

    let mut feature = TrackFeature::new(
        child_text(owner, "name").unwrap_or_default(),
        Geometry::LineString(coords),
    );
    feature.description = describe(owner);
    feature.times = times;
    Some(feature)
}

fn read_point(node: Node) -> Option<(Coord, Option<DateTime<Utc>>)> {
    let lat = node.attribute("lat")?.trim().parse::<f64>().ok()?;
    let lng = node.attribute("lon")?.trim().parse::<f64>().ok()?;
    if !crate::geometry::is_valid_lat_lng(lat, lng) {
        return None;
    }
    let alt = child_text(node, "ele")
        .and_then(|e| e.parse::<f64>().ok())
        .filter(|a| a.is_finite());
    let time = child_text(node, "time").and_then(|t| parse_timestamp(&t));
    Some((Coord::with_alt(lng, lat, alt), time))
}

fn describe(node: Node) -> String {
    child_text(node, "desc")
        .or_else(|| child_text(node, "cmt"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="25.0330" lon="121.5654"><name>Taipei 101</name><desc>tower</desc></wpt>
  <wpt lat="95" lon="0"><name>broken</name></wpt>
  <rte><name>route</name>
    <rtept lat="1" lon="2"/><rtept lat="3" lon="4"/>
  </rte>
  <trk><name>Morning walk</name>
    <trkseg>
      <trkpt lat="52.0" lon="4.0"><ele>1.5</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="52.1" lon="4.1"><ele>2.5</ele><time>2024-05-01T08:10:00Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="52.2" lon="4.2"><time>2024-05-01T09:00:00Z</time></trkpt>
      <trkpt lat="52.3" lon="4.3"/>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_read_gpx_features() {
        let tracks = read_gpx(GPX).unwrap();
        let features = tracks.features();
        assert_eq!(features.len(), 4, "1 valid waypoint, 1 route, 2 segments");

        assert_eq!(features[0].name, "Taipei 101");
        assert_eq!(features[0].description, "tower");
        assert_eq!(
            features[0].geometry,
            Geometry::Point(Coord::new(121.5654, 25.0330)),
            "Coordinates are stored longitude first"
        );

        assert_eq!(features[1].name, "route");
        assert!(features[1].times.is_none());
    }

    #[test]
    fn test_track_segment_times() {
        let tracks = read_gpx(GPX).unwrap();
        let walk = &tracks.features()[2];
        assert_eq!(walk.name, "Morning walk");
        let times = walk.times.as_ref().expect("First segment is fully timed");
        assert_eq!(times.len(), 2);
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 5, 1, 8, 10, 0).unwrap());
        match &walk.geometry {
            Geometry::LineString(line) => assert_eq!(line[0].alt, Some(1.5)),
            other => panic!("Expected a LineString, got {other:?}"),
        }

        assert!(
            tracks.features()[3].times.is_none(),
            "Partially timed segment drops its times"
        );
    }

    #[test]
    fn test_rejects_non_gpx_root() {
        let err = read_gpx("<kml></kml>").unwrap_err();
        assert!(matches!(err, PhotoMapError::MalformedInput { format: "GPX", .. }));
    }
}
