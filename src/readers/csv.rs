use super::xml::parse_leading_f64;
use crate::error::{PhotoMapError, Result};
use crate::geometry::is_valid_lat_lng;
use crate::model::{Coord, Geometry, TrackCollection, TrackFeature};
use tracing::debug;

struct Columns {
    lat: usize,
    lng: usize,
    name: Option<usize>,
    desc: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<String> = split_row(header)
            .into_iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let find = |name: &str| names.iter().position(|h| h == name);
        let (Some(lat), Some(lng)) = (find("lat"), find("lng")) else {
            return Err(PhotoMapError::malformed(
                "CSV",
                format!("header must contain lat and lng columns, got \"{header}\""),
            ));
        };
        Ok(Self {
            lat,
            lng,
            name: find("name"),
            desc: find("desc"),
        })
    }
}

/// Reads point rows from a `lat,lng[,name,desc]` CSV.
///
/// The header is required and matched case-insensitively. Rows whose coordinates are not
/// finite numbers inside the valid range are skipped, so a file may yield zero features.
pub fn read_csv(text: &str) -> Result<TrackCollection> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| PhotoMapError::malformed("CSV", "empty document"))?;
    let columns = Columns::from_header(header.trim_start_matches('\u{feff}'))?;

    let mut tracks = TrackCollection::new();
    for (row_index, line) in lines.enumerate() {
        let cells = split_row(line);
        let cell = |i: usize| cells.get(i).map(|c| c.trim()).unwrap_or_default();
        let lat = parse_leading_f64(cell(columns.lat));
        let lng = parse_leading_f64(cell(columns.lng));
        let (Some(lat), Some(lng)) = (lat, lng) else {
            debug!("Skipping CSV row {}: coordinates are not numeric", row_index + 1);
            continue;
        };
        if !is_valid_lat_lng(lat, lng) {
            debug!("Skipping CSV row {}: ({lat}, {lng}) is out of range", row_index + 1);
            continue;
        }
        let mut feature = TrackFeature::new(
            columns.name.map(cell).unwrap_or_default(),
            Geometry::Point(Coord::new(lng, lat)),
        );
        feature.description = columns.desc.map(cell).unwrap_or_default().to_string();
        tracks.push(feature);
    }
    Ok(tracks)
}

/// Splits on commas, honouring double-quoted cells with `""` escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}
