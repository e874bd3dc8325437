//! KML 2.2 document writer.
use super::{ExportOptions, ExportedPhoto};
use crate::color::kml_color;
use crate::model::{Coord, Geometry, PhotoKind, TrackCollection, TrackFeature};
use crate::registry::PhotoRegistry;
use crate::time::format_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const CAMERA_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/camera.png";
const LINE_OPACITY: f64 = 0.9;
pub const KML_MIME: &str = "application/vnd.google-earth.kml+xml";

/// What the document may reference besides itself.
#[derive(Debug, Clone, Copy)]
pub enum KmlFlavor<'a> {
    /// A bare document; photos carry no media.
    Plain,
    /// `doc.kml` inside a KMZ. Maps photo ids to their file name under `files/`.
    Kmz(&'a HashMap<String, String>),
}

impl KmlFlavor<'_> {
    fn asset_of(&self, photo_id: &str) -> Option<&str> {
        match self {
            KmlFlavor::Plain => None,
            KmlFlavor::Kmz(names) => names.get(photo_id).map(String::as_str),
        }
    }
}

/// Escapes the five XML special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Icon heading: whole degrees in `[0, 359]`.
fn icon_heading(bearing: f64) -> i32 {
    (bearing.clamp(0.0, 359.9).round() as i32).min(359)
}

fn coordinate(coord: &Coord) -> String {
    match coord.alt {
        Some(alt) => format!("{},{},{}", coord.lng, coord.lat, alt),
        None => format!("{},{}", coord.lng, coord.lat),
    }
}

fn coordinates(coords: &[Coord]) -> String {
    coords.iter().map(coordinate).collect::<Vec<_>>().join(" ")
}

fn photo_point(photo: &ExportedPhoto, lat: f64, lng: f64) -> String {
    let coord = Coord::with_alt(lng, lat, photo.alt);
    format!("<Point><coordinates>{}</coordinates></Point>", coordinate(&coord))
}

fn time_stamp(when: Option<&str>) -> String {
    when.map(|when| format!("<TimeStamp><when>{}</when></TimeStamp>", escape(when)))
        .unwrap_or_default()
}

/// The fields the media extractor reads back.
fn extended_data(photo: &ExportedPhoto) -> String {
    let mut entries: Vec<(&str, String)> = vec![
        ("id", photo.id.clone()),
        ("type", photo.kind.as_str().to_string()),
    ];
    if let Some(bearing) = photo.bearing {
        entries.push(("bearing", bearing.to_string()));
    }
    entries.push(("yaw", photo.yaw.to_string()));
    entries.push(("pitch", photo.pitch.to_string()));
    entries.push(("width", photo.width.to_string()));
    entries.push(("height", photo.height.to_string()));
    let optional = [
        ("tags", photo.tags.join(",")),
        ("author", photo.author.clone()),
        ("license", photo.license.clone()),
        ("description", photo.description.clone()),
    ];
    entries.extend(optional.into_iter().filter(|(_, value)| !value.is_empty()));
    if photo.hidden {
        entries.push(("hidden", "true".to_string()));
    }

    let data: String = entries
        .iter()
        .map(|(name, value)| format!("<Data name=\"{name}\"><value>{}</value></Data>", escape(value)))
        .collect();
    format!("<ExtendedData>{data}</ExtendedData>")
}

/// HTML balloon shown by viewers. Only markup we control goes in unescaped.
fn balloon(photo: &ExportedPhoto, asset: Option<&str>) -> String {
    let mut html = format!("<div><b>{}</b></div>", escape(photo.display_name()));
    if !photo.description.is_empty() {
        html.push_str(&format!("<div>{}</div>", escape(&photo.description)));
    }
    if let Some(asset) = asset {
        let src = escape(&format!("files/{asset}"));
        if photo.kind == PhotoKind::Video {
            html.push_str(&format!(
                "<video src=\"{src}\" controls style=\"max-width:480px;width:100%\"></video>"
            ));
        } else {
            html.push_str(&format!(
                "<img src=\"{src}\" style=\"max-width:480px;width:100%\"/>"
            ));
        }
    }
    if !photo.tags.is_empty() {
        let tags: Vec<String> = photo.tags.iter().map(|t| format!("#{}", escape(t))).collect();
        html.push_str(&format!("<div>{}</div>", tags.join(" ")));
    }
    if !photo.author.is_empty() {
        html.push_str(&format!("<div>Author: {}</div>", escape(&photo.author)));
    }
    if !photo.license.is_empty() {
        html.push_str(&format!("<div>License: {}</div>", escape(&photo.license)));
    }
    if photo.kind == PhotoKind::Panorama {
        html.push_str("<div>360° panorama</div>");
    }
    format!("<div>{html}</div>")
}

fn photo_placemark(photo: &ExportedPhoto, lat: f64, lng: f64, asset: Option<&str>) -> String {
    let style = if photo.kind == PhotoKind::Panorama { "pano" } else { "photo" };
    let heading = photo
        .bearing
        .map(|b| {
            format!(
                "<Style><IconStyle><heading>{}</heading></IconStyle></Style>",
                icon_heading(b)
            )
        })
        .unwrap_or_default();
    format!(
        "<Placemark><name>{}</name><styleUrl>#{style}</styleUrl>{heading}<description>{}</description>{}{}{}</Placemark>\n",
        escape(photo.display_name()),
        cdata(&balloon(photo, asset)),
        time_stamp(photo.captured_at.as_deref()),
        extended_data(photo),
        photo_point(photo, lat, lng),
    )
}

/// A spherical overlay so panorama-aware viewers can open the image in place.
fn photo_overlay(photo: &ExportedPhoto, lat: f64, lng: f64, asset: &str) -> String {
    let heading = photo
        .bearing
        .map(|b| format!("<heading>{b}</heading>"))
        .unwrap_or_default();
    format!(
        concat!(
            "<PhotoOverlay><name>{name}</name>",
            "<Camera><longitude>{lng}</longitude><latitude>{lat}</latitude><altitude>0</altitude>",
            "{heading}<tilt>{tilt}</tilt><roll>0</roll></Camera>",
            "{when}{data}<Icon><href>{href}</href></Icon>",
            "<ViewVolume><leftFov>-90</leftFov><rightFov>90</rightFov>",
            "<bottomFov>-45</bottomFov><topFov>45</topFov><near>1</near></ViewVolume>",
            "{point}<shape>sphere</shape></PhotoOverlay>\n"
        ),
        name = escape(photo.display_name()),
        lng = lng,
        lat = lat,
        heading = heading,
        tilt = photo.pitch,
        when = time_stamp(photo.captured_at.as_deref()),
        data = extended_data(photo),
        href = escape(&format!("files/{asset}")),
        point = photo_point(photo, lat, lng),
    )
}

fn geometry_kml(geometry: &Geometry, times: Option<&[DateTime<Utc>]>) -> String {
    match geometry {
        Geometry::Point(coord) => format!("<Point><coordinates>{}</coordinates></Point>", coordinate(coord)),
        Geometry::LineString(line) => match times.filter(|t| t.len() == line.len()) {
            Some(times) => {
                let whens: String = times
                    .iter()
                    .map(|t| format!("<when>{}</when>", format_timestamp(t)))
                    .collect();
                let coords: String = line
                    .iter()
                    .map(|c| match c.alt {
                        Some(alt) => format!("<gx:coord>{} {} {}</gx:coord>", c.lng, c.lat, alt),
                        None => format!("<gx:coord>{} {}</gx:coord>", c.lng, c.lat),
                    })
                    .collect();
                format!("<gx:Track>{whens}{coords}</gx:Track>")
            }
            None => format!("<LineString><coordinates>{}</coordinates></LineString>", coordinates(line)),
        },
        Geometry::Polygon(rings) => polygon_kml(rings),
        Geometry::MultiLineString(lines) => {
            let parts: String = lines
                .iter()
                .map(|line| format!("<LineString><coordinates>{}</coordinates></LineString>", coordinates(line)))
                .collect();
            format!("<MultiGeometry>{parts}</MultiGeometry>")
        }
        Geometry::MultiPolygon(polygons) => {
            let parts: String = polygons.iter().map(|rings| polygon_kml(rings)).collect();
            format!("<MultiGeometry>{parts}</MultiGeometry>")
        }
    }
}

fn polygon_kml(rings: &[Vec<Coord>]) -> String {
    let Some((outer, holes)) = rings.split_first() else {
        return String::new();
    };
    let inner: String = holes
        .iter()
        .map(|ring| {
            format!(
                "<innerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></innerBoundaryIs>",
                coordinates(ring)
            )
        })
        .collect();
    format!(
        "<Polygon><outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs>{inner}</Polygon>",
        coordinates(outer)
    )
}

fn feature_placemark(feature: &TrackFeature) -> String {
    let mut kml = format!("<Placemark><name>{}</name>", escape(&feature.name));
    if !feature.description.is_empty() {
        kml.push_str(&format!("<description>{}</description>", escape(&feature.description)));
    }
    if let Some(style) = &feature.style {
        kml.push_str(&format!(
            "<Style><LineStyle><color>{}</color><width>{}</width></LineStyle>",
            kml_color(style.color_or_default(), LINE_OPACITY),
            style.weight_or_default()
        ));
        if matches!(feature.geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_)) {
            kml.push_str(&format!(
                "<PolyStyle><color>{}</color><fill>1</fill><outline>1</outline></PolyStyle>",
                kml_color(style.fill_color_or_default(), style.fill_opacity_or_default())
            ));
        }
        kml.push_str("</Style>");
    }
    if let (Geometry::Point(_), Some([time])) = (&feature.geometry, feature.times.as_deref()) {
        kml.push_str(&time_stamp(Some(&format_timestamp(time))));
    }
    kml.push_str(&geometry_kml(&feature.geometry, feature.times.as_deref()));
    kml.push_str("</Placemark>\n");
    kml
}

fn icon_style(id: &str, scale: f64) -> String {
    format!(
        "<Style id=\"{id}\"><IconStyle><scale>{scale}</scale><Icon><href>{CAMERA_ICON}</href></Icon></IconStyle></Style>\n"
    )
}

/// Serializes the geolocated photos and every track feature.
///
/// Photos keep their id, kind, orientation, size and credits in `ExtendedData` so that
/// importing the document again recovers them. With [`KmlFlavor::Kmz`], photos reference
/// their media under `files/` and panoramas also get a `PhotoOverlay`.
pub fn write_kml(
    registry: &PhotoRegistry,
    tracks: &TrackCollection,
    options: &ExportOptions,
    flavor: KmlFlavor,
) -> String {
    let photos: Vec<(ExportedPhoto, f64, f64)> = registry
        .positioned()
        .map(|photo| ExportedPhoto::from_photo(photo, options.coordinate_precision))
        .filter_map(|photo| photo.lat_lng().map(|(lat, lng)| (photo, lat, lng)))
        .collect();

    let mut kml = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<kml xmlns=\"http://www.opengis.net/kml/2.2\" xmlns:gx=\"http://www.google.com/kml/ext/2.2\">\n",
        "<Document>\n"
    ));
    kml.push_str(&format!("<name>{}</name>\n", escape(&options.project_title)));
    kml.push_str(&icon_style("photo", 1.1));
    kml.push_str(&icon_style("pano", 1.2));

    kml.push_str("<Folder><name>Photos</name>\n");
    for (photo, lat, lng) in &photos {
        kml.push_str(&photo_placemark(photo, *lat, *lng, flavor.asset_of(&photo.id)));
    }
    for (photo, lat, lng) in &photos {
        if photo.kind == PhotoKind::Panorama
            && let Some(asset) = flavor.asset_of(&photo.id)
        {
            kml.push_str(&photo_overlay(photo, *lat, *lng, asset));
        }
    }
    kml.push_str("</Folder>\n");

    if !tracks.is_empty() {
        kml.push_str("<Folder><name>Annotations</name>\n");
        for feature in tracks {
            kml.push_str(&feature_placemark(feature));
        }
        kml.push_str("</Folder>\n");
    }

    kml.push_str("</Document>\n</kml>\n");
    kml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::AssetIndex;
    use crate::extract::extract_photos;
    use crate::model::{LatLng, Photo, TrackStyle};
    use crate::readers::read_kml;
    use crate::readers::xml::parse_document;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn options() -> ExportOptions {
        ExportOptions::builder()
            .project_title("Trip & <Co>")
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .build()
    }

    fn registry() -> PhotoRegistry {
        let mut registry = PhotoRegistry::new();
        registry.insert(
            Photo::builder()
                .name("IMG_1.jpg")
                .width(800)
                .height(600)
                .position(LatLng::new(25.0339651, 121.5644722).unwrap())
                .bearing(359.7)
                .title("Tower \"101\"")
                .description("Tall ]]> building")
                .author("Ann")
                .license("CC-BY")
                .tags(["city".to_string(), "night".to_string()].into())
                .captured_at(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap())
                .build(),
        );
        registry.insert(Photo::builder().name("unplaced.jpg").build());
        registry
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&apos;&lt;/a&gt;");
    }

    #[test]
    fn test_cdata_splits_terminator() {
        assert_eq!(cdata("plain"), "<![CDATA[plain]]>");
        assert_eq!(cdata("a]]>b"), "<![CDATA[a]]]]><![CDATA[>b]]>");
    }

    #[test]
    fn test_icon_heading_stays_in_range() {
        assert_eq!(icon_heading(359.7), 359);
        assert_eq!(icon_heading(12.4), 12);
        assert_eq!(icon_heading(-3.0), 0);
    }

    #[test]
    fn test_document_structure() {
        let kml = write_kml(&registry(), &TrackCollection::new(), &options(), KmlFlavor::Plain);
        assert!(kml.contains("<name>Trip &amp; &lt;Co&gt;</name>"));
        assert!(kml.contains("<Style id=\"photo\">") && kml.contains("<Style id=\"pano\">"));
        assert!(kml.contains("<heading>359</heading>"));
        assert!(kml.contains("<coordinates>121.56447,25.03397</coordinates>"));
        assert!(kml.contains("<div>Tall ]]&gt; building</div>"));
        assert!(!kml.contains("Tall ]]>"), "A raw terminator would end the CDATA body");
        assert!(!kml.contains("Annotations"), "No folder without features");
        assert!(!kml.contains("unplaced"));
        assert!(!kml.contains("<img"), "Plain KML carries no media");
        parse_document(&kml).expect("Output is well-formed XML");
    }

    #[test]
    fn test_photo_round_trip_through_extractor() {
        let registry = registry();
        let original = registry.iter().next().unwrap();
        let kml = write_kml(&registry, &TrackCollection::new(), &options(), KmlFlavor::Plain);

        let doc = parse_document(&kml).unwrap();
        let extraction = extract_photos(&doc, &Arc::new(AssetIndex::new()), None);
        assert_eq!(extraction.photos.len(), 1);
        let photo = &extraction.photos[0];
        assert_eq!(photo.id(), original.id());
        assert_eq!(photo.title, "Tower \"101\"");
        assert_eq!(photo.description, "Tall ]]> building");
        assert_eq!(photo.position(), Some(LatLng::new(25.03397, 121.56447).unwrap()));
        assert_eq!(photo.bearing(), Some(359.0), "The icon heading wins over ExtendedData");
        assert_eq!(photo.tags, original.tags);
        assert_eq!(photo.license, "CC-BY");
        assert_eq!(photo.captured_at, original.captured_at);
        assert_eq!((photo.width, photo.height), (800, 600));
    }

    #[test]
    fn test_tracks_round_trip() {
        let mut walk = TrackFeature::new(
            "walk",
            Geometry::LineString(vec![Coord::new(4.0, 52.0), Coord::with_alt(4.1, 52.1, Some(3.0))]),
        );
        walk.times = Some(vec![
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 1, 0).unwrap(),
        ]);
        let mut field = TrackFeature::new(
            "field",
            Geometry::Polygon(vec![vec![
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(1.0, 1.0),
                Coord::new(0.0, 0.0),
            ]]),
        );
        field.description = "grass".to_string();
        field.style = Some(TrackStyle {
            color: Some("#ff0000".to_string()),
            weight: Some(3.0),
            fill_color: Some("#00ff00".to_string()),
            fill_opacity: Some(0.5),
        });
        let tracks = TrackCollection::from(vec![walk.clone(), field.clone()]);

        let kml = write_kml(&PhotoRegistry::new(), &tracks, &options(), KmlFlavor::Plain);
        let back = read_kml(&kml).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.features()[0], walk);
        assert_eq!(back.features()[1].description, "grass");
        assert_eq!(back.features()[1].style, field.style);
    }

    #[test]
    fn test_kmz_flavor_references_files() {
        let mut registry = PhotoRegistry::new();
        let id = registry.insert(
            Photo::builder()
                .name("sphere.jpg")
                .width(4000)
                .height(2000)
                .position(LatLng::new(1.0, 2.0).unwrap())
                .pitch(5.0)
                .build(),
        );
        let names = HashMap::from([(id, "sphere.jpg".to_string())]);
        let kml = write_kml(&registry, &TrackCollection::new(), &options(), KmlFlavor::Kmz(&names));
        assert!(kml.contains("<img src=\"files/sphere.jpg\""));
        assert!(kml.contains("<PhotoOverlay>"));
        assert!(kml.contains("<Icon><href>files/sphere.jpg</href></Icon>"));
        assert!(kml.contains("<tilt>5</tilt>"));
        assert!(!kml.contains("<heading>"), "No heading without a bearing");
    }
}
