use super::xml::{child, child_text, children, descendants, is, parse_document, select, text_content};
use crate::color::parse_kml_color;
use crate::error::{PhotoMapError, Result};
use crate::geometry::is_valid_lat_lng;
use crate::model::{Coord, Geometry, TrackCollection, TrackFeature, TrackStyle};
use crate::time::parse_timestamp;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use roxmltree::{Document, Node, NodeId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

lazy_static! {
    static ref COMMA_SPACE_RE: Regex = Regex::new(r"\s*,\s*").unwrap();
}

const ROOT_ELEMENTS: [&str; 4] = ["kml", "Document", "Folder", "Placemark"];

type Times = Option<Vec<DateTime<Utc>>>;

/// Reads the drawn geometry of every Placemark in a KML document.
pub fn read_kml(text: &str) -> Result<TrackCollection> {
    let doc = parse_document(text)?;
    read_kml_tracks(&doc, &HashSet::new())
}

/// Like [`read_kml`] on an already parsed document, leaving out the given Placemarks (the
/// ones the media extractor turned into photos).
pub(crate) fn read_kml_tracks(doc: &Document, skip: &HashSet<NodeId>) -> Result<TrackCollection> {
    let root = doc.root_element();
    if !ROOT_ELEMENTS.iter().any(|name| is(root, name)) {
        return Err(PhotoMapError::malformed(
            "KML",
            format!("unexpected root element <{}>", root.tag_name().name()),
        ));
    }

    let styles = StyleSheet::collect(root);
    let mut tracks = TrackCollection::new();

    let placemarks = std::iter::once(root)
        .filter(|n| is(*n, "Placemark"))
        .chain(descendants(root, "Placemark"));
    for placemark in placemarks {
        if skip.contains(&placemark.id()) {
            continue;
        }
        let name = child_text(placemark, "name").unwrap_or_default();
        let mut parts = Vec::new();
        read_geometries(placemark, &mut parts);
        if parts.is_empty() {
            debug!("Placemark '{name}' has no readable geometry, skipping");
            continue;
        }

        let description = child_text(placemark, "description").unwrap_or_default();
        let style = styles.resolve(placemark);
        let stamp = select(placemark, &["TimeStamp", "when"])
            .and_then(|when| parse_timestamp(&text_content(when)));

        for (geometry, times) in parts {
            let times = match (&geometry, times, stamp) {
                (_, Some(times), _) => Some(times),
                (Geometry::Point(_), None, Some(stamp)) => Some(vec![stamp]),
                _ => None,
            };
            tracks.push(TrackFeature {
                name: name.clone(),
                description: description.clone(),
                geometry,
                times,
                style: style.clone(),
            });
        }
    }

    Ok(tracks)
}

/// Parses a KML `coordinates` value: whitespace separated `lng,lat[,alt]` tuples.
/// Tuples that do not parse or are out of range are dropped.
pub(crate) fn parse_coordinates(text: &str) -> Vec<Coord> {
    let compact = COMMA_SPACE_RE.replace_all(text.trim(), ",");
    compact
        .split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',').map(|p| p.parse::<f64>());
            let lng = parts.next()?.ok()?;
            let lat = parts.next()?.ok()?;
            let alt = parts.next().and_then(|a| a.ok()).filter(|a| a.is_finite());
            is_valid_lat_lng(lat, lng).then(|| Coord::with_alt(lng, lat, alt))
        })
        .collect()
}

fn coordinates_of(node: Node) -> Vec<Coord> {
    child(node, "coordinates")
        .map(|c| parse_coordinates(&text_content(c)))
        .unwrap_or_default()
}

fn read_geometries(parent: Node, out: &mut Vec<(Geometry, Times)>) {
    for node in parent.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "Point" => {
                if let Some(coord) = coordinates_of(node).first() {
                    out.push((Geometry::Point(*coord), None));
                }
            }
            "LineString" | "LinearRing" => {
                let line = coordinates_of(node);
                if line.len() >= 2 {
                    out.push((Geometry::LineString(line), None));
                }
            }
            "Polygon" => {
                if let Some(rings) = read_polygon(node) {
                    out.push((Geometry::Polygon(rings), None));
                }
            }
            "Track" => {
                if let Some(part) = read_track(node) {
                    out.push(part);
                }
            }
            "MultiTrack" => read_geometries(node, out),
            "MultiGeometry" => {
                let mut inner = Vec::new();
                read_geometries(node, &mut inner);
                out.extend(group_multi(inner));
            }
            _ => {}
        }
    }
}

fn read_polygon(node: Node) -> Option<Vec<Vec<Coord>>> {
    let outer = select(node, &["outerBoundaryIs", "LinearRing"]).map(coordinates_of)?;
    if outer.len() < 3 {
        return None;
    }
    let mut rings = vec![outer];
    for inner in children(node, "innerBoundaryIs") {
        if let Some(ring) = child(inner, "LinearRing").map(coordinates_of)
            && ring.len() >= 3
        {
            rings.push(ring);
        }
    }
    Some(rings)
}

/// `gx:Track`: parallel `when` and `gx:coord` lists. `gx:coord` is space separated.
fn read_track(node: Node) -> Option<(Geometry, Times)> {
    let coords: Vec<Coord> = children(node, "coord")
        .filter_map(|c| {
            let text = text_content(c);
            let mut parts = text.split_whitespace().map(|p| p.parse::<f64>());
            let lng = parts.next()?.ok()?;
            let lat = parts.next()?.ok()?;
            let alt = parts.next().and_then(|a| a.ok()).filter(|a| a.is_finite());
            is_valid_lat_lng(lat, lng).then(|| Coord::with_alt(lng, lat, alt))
        })
        .collect();
    if coords.len() < 2 {
        return None;
    }
    let times: Times = children(node, "when")
        .map(|w| parse_timestamp(&text_content(w)))
        .collect::<Option<Vec<_>>>()
        .filter(|times| times.len() == coords.len());
    Some((Geometry::LineString(coords), times))
}

/// Folds the parts of a `MultiGeometry` into one Multi* geometry when they are all
/// untimed lines or all polygons.
fn group_multi(parts: Vec<(Geometry, Times)>) -> Vec<(Geometry, Times)> {
    if parts.len() < 2 {
        return parts;
    }
    if parts
        .iter()
        .all(|(g, t)| matches!(g, Geometry::LineString(_)) && t.is_none())
    {
        let lines = parts
            .into_iter()
            .filter_map(|(g, _)| match g {
                Geometry::LineString(line) => Some(line),
                _ => None,
            })
            .collect();
        return vec![(Geometry::MultiLineString(lines), None)];
    }
    if parts.iter().all(|(g, _)| matches!(g, Geometry::Polygon(_))) {
        let polygons = parts
            .into_iter()
            .filter_map(|(g, _)| match g {
                Geometry::Polygon(rings) => Some(rings),
                _ => None,
            })
            .collect();
        return vec![(Geometry::MultiPolygon(polygons), None)];
    }
    parts
}

/// Shared `<Style id>` and `<StyleMap id>` definitions of a document.
struct StyleSheet<'a, 'i> {
    styles: HashMap<&'a str, Node<'a, 'i>>,
    maps: HashMap<&'a str, String>,
}

impl<'a, 'i: 'a> StyleSheet<'a, 'i> {
    fn collect(root: Node<'a, 'i>) -> Self {
        let mut styles = HashMap::new();
        let mut maps = HashMap::new();
        for node in root.descendants() {
            let Some(id) = node.attribute("id") else {
                continue;
            };
            if is(node, "Style") {
                styles.insert(id, node);
            } else if is(node, "StyleMap") {
                let normal = children(node, "Pair")
                    .find(|pair| child_text(*pair, "key").as_deref() == Some("normal"))
                    .and_then(|pair| child_text(pair, "styleUrl"));
                if let Some(url) = normal {
                    maps.insert(id, url);
                }
            }
        }
        Self { styles, maps }
    }

    /// Shared style from `styleUrl` (following one StyleMap hop), overridden by an inline
    /// `<Style>`. `None` when neither says anything about lines or fills.
    fn resolve(&self, placemark: Node) -> Option<TrackStyle> {
        let mut style = TrackStyle::default();
        if let Some(url) = child_text(placemark, "styleUrl") {
            let id = url.trim_start_matches('#');
            let id = self
                .maps
                .get(id)
                .map(|target| target.trim_start_matches('#'))
                .unwrap_or(id);
            if let Some(shared) = self.styles.get(id) {
                apply_style(*shared, &mut style);
            }
        }
        if let Some(inline) = child(placemark, "Style") {
            apply_style(inline, &mut style);
        }
        (!style.is_empty()).then_some(style)
    }
}

fn apply_style(node: Node, style: &mut TrackStyle) {
    if let Some(line) = child(node, "LineStyle") {
        if let Some((hex, _)) = child_text(line, "color").and_then(|c| parse_kml_color(&c)) {
            style.color = Some(hex);
        }
        if let Some(width) = child_text(line, "width").and_then(|w| w.parse::<f64>().ok()) {
            style.weight = Some(width);
        }
    }
    if let Some(poly) = child(node, "PolyStyle")
        && let Some((hex, opacity)) = child_text(poly, "color").and_then(|c| parse_kml_color(&c))
    {
        style.fill_color = Some(hex);
        style.fill_opacity = Some(opacity);
    }
}
