use super::find_tag;
use crate::model::LatLng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One GPS component as metadata extractors hand it over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpsValue {
    /// Plain decimal degrees (or metres for altitude).
    Decimal(f64),
    /// Degrees, minutes, seconds. Each part may itself have been a rational.
    Dms([f64; 3]),
    Rational { num: f64, den: f64 },
}

impl GpsValue {
    /// Reads a number, numeric string or `{numerator, denominator}` object. Any non-empty
    /// array is taken as `[deg, min, sec]`, each part possibly a rational, with missing parts
    /// counted as 0.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(GpsValue::Decimal),
            Value::String(s) => s.trim().parse::<f64>().ok().map(GpsValue::Decimal),
            Value::Object(_) => rational_parts(value).map(|(num, den)| GpsValue::Rational { num, den }),
            Value::Array(parts) if !parts.is_empty() => {
                let mut dms = [0.0; 3];
                for (slot, part) in dms.iter_mut().zip(parts) {
                    *slot = component(part)?;
                }
                Some(GpsValue::Dms(dms))
            }
            _ => None,
        }
    }

    pub fn to_degrees(&self) -> f64 {
        match *self {
            GpsValue::Decimal(value) => value,
            GpsValue::Rational { num, den } => rational(num, den),
            GpsValue::Dms([deg, min, sec]) => {
                let sign = if deg < 0.0 { -1.0 } else { 1.0 };
                sign * (deg.abs() + min / 60.0 + sec / 3600.0)
            }
        }
    }
}

fn rational(num: f64, den: f64) -> f64 {
    num / if den == 0.0 { 1.0 } else { den }
}

fn rational_parts(value: &Value) -> Option<(f64, f64)> {
    let num = value.get("numerator")?.as_f64()?;
    let den = value.get("denominator").and_then(Value::as_f64).unwrap_or(1.0);
    Some((num, den))
}

/// A DMS element: a number, numeric string, rational object or `[num, den]` pair.
fn component(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(_) => rational_parts(value).map(|(num, den)| rational(num, den)),
        Value::Array(pair) if pair.len() == 2 => Some(rational(pair[0].as_f64()?, pair[1].as_f64()?)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub image_direction: Option<f64>,
}

impl GpsInfo {
    pub fn position(&self) -> Option<LatLng> {
        LatLng::new(self.latitude, self.longitude).ok()
    }
}

const LATITUDE_TAGS: [&str; 3] = ["gps.latitude", "latitude", "GPSLatitude"];
const LONGITUDE_TAGS: [&str; 3] = ["gps.longitude", "longitude", "GPSLongitude"];
const ALTITUDE_TAGS: [&str; 3] = ["gps.altitude", "altitude", "GPSAltitude"];

/// Reads the GPS position from an extractor tag mapping.
///
/// Returns `None` unless both latitude and longitude are present and in range.
pub fn get_gps_info(tags: &Value) -> Option<GpsInfo> {
    let mut latitude = read_degrees(tags, &LATITUDE_TAGS)?;
    let mut longitude = read_degrees(tags, &LONGITUDE_TAGS)?;

    if ref_is(tags, "GPSLatitudeRef", &["S", "South"]) {
        latitude = -latitude.abs();
    }
    if ref_is(tags, "GPSLongitudeRef", &["W", "West"]) {
        longitude = -longitude.abs();
    }
    LatLng::new(latitude, longitude).ok()?;

    let mut altitude = read_degrees(tags, &ALTITUDE_TAGS).filter(|a| a.is_finite());
    if let Some(alt) = altitude.as_mut()
        && find_tag(tags, &["GPSAltitudeRef"]).is_some_and(|r| {
            r.as_u64() == Some(1) || r.as_str().is_some_and(|s| s.starts_with("Below") || s == "1")
        })
    {
        *alt = -alt.abs();
    }

    Some(GpsInfo {
        latitude,
        longitude,
        altitude,
        image_direction: read_degrees(tags, &["GPSImgDirection"]),
    })
}

/// First tag in `names` that holds a usable number, converted to degrees.
pub fn read_degrees(tags: &Value, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .filter_map(|&name| find_tag(tags, &[name]))
        .find_map(GpsValue::from_json)
        .map(|value| value.to_degrees())
        .filter(|degrees| degrees.is_finite())
}

fn ref_is(tags: &Value, name: &str, accepted: &[&str]) -> bool {
    find_tag(tags, &[name])
        .and_then(Value::as_str)
        .is_some_and(|r| accepted.iter().any(|a| r.trim().eq_ignore_ascii_case(a)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gps_value_variants() {
        assert_eq!(GpsValue::from_json(&json!(52.5)), Some(GpsValue::Decimal(52.5)));
        assert_eq!(
            GpsValue::from_json(&json!({"numerator": 105, "denominator": 2})).map(|v| v.to_degrees()),
            Some(52.5)
        );
        assert_eq!(
            GpsValue::from_json(&json!({"numerator": 7, "denominator": 0})).map(|v| v.to_degrees()),
            Some(7.0),
            "Zero denominator falls back to 1"
        );
        let dms = GpsValue::from_json(&json!([52, 30, 36])).unwrap();
        assert!((dms.to_degrees() - 52.51).abs() < 1e-9);
    }

    #[test]
    fn test_dms_with_rational_parts_and_negative_degrees() {
        let value = json!([
            {"numerator": -33, "denominator": 1},
            {"numerator": 52, "denominator": 1},
            [4104, 100]
        ]);
        let degrees = GpsValue::from_json(&value).unwrap().to_degrees();
        let expected = -(33.0 + 52.0 / 60.0 + 41.04 / 3600.0);
        assert!((degrees - expected).abs() < 1e-9, "Got {degrees}");
    }

    #[test]
    fn test_short_array_is_degrees_and_minutes() {
        assert_eq!(
            GpsValue::from_json(&json!([52, 30])),
            Some(GpsValue::Dms([52.0, 30.0, 0.0]))
        );
        assert_eq!(GpsValue::from_json(&json!([])), None);
    }

    #[test]
    fn test_dms_zero_degrees_is_positive() {
        let degrees = GpsValue::from_json(&json!([0, 30, 0])).unwrap().to_degrees();
        assert_eq!(degrees, 0.5);
    }

    #[test]
    fn test_get_gps_info_lookup_order() {
        let tags = json!({
            "gps": { "latitude": 10.0, "longitude": 20.0 },
            "latitude": 11.0,
            "GPSLatitude": 12.0,
            "GPSLongitude": 22.0
        });
        let info = get_gps_info(&tags).unwrap();
        assert_eq!(info.latitude, 10.0);
        assert_eq!(info.longitude, 20.0);
    }

    #[test]
    fn test_get_gps_info_exif_style_with_refs() {
        let tags = json!({
            "GPSLatitude": [33, 52, 4.1],
            "GPSLatitudeRef": "S",
            "GPSLongitude": [151, 12, 33.5],
            "GPSLongitudeRef": "E",
            "GPSAltitude": {"numerator": 585, "denominator": 10},
            "GPSImgDirection": 270.5
        });
        let info = get_gps_info(&tags).unwrap();
        assert!(info.latitude < -33.8 && info.latitude > -33.9);
        assert!(info.longitude > 151.2 && info.longitude < 151.21);
        assert_eq!(info.altitude, Some(58.5));
        assert_eq!(info.image_direction, Some(270.5));
    }

    #[test]
    fn test_get_gps_info_needs_both_coordinates() {
        assert!(get_gps_info(&json!({ "GPSLatitude": 52.0 })).is_none());
        assert!(get_gps_info(&json!({ "latitude": 95.0, "longitude": 4.0 })).is_none());
        assert!(get_gps_info(&json!({})).is_none());
    }
}
