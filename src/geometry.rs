//! Spherical-Earth helpers used to draw a photo's viewing direction on the map.

/// Equatorial radius in metres, as used by web-mercator map widgets.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Largest bearing a photo may carry. 360 itself is folded back to 0.
pub const MAX_BEARING: f64 = 359.9;

/// Moves from `(lat, lng)` along the great circle with the given initial bearing.
///
/// Inputs and outputs are in degrees, the distance in metres. Out of range input is not
/// rejected; NaN in gives NaN out.
pub fn destination_point(lat: f64, lng: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let angular = distance_m / EARTH_RADIUS_M;
    let lat1 = lat.to_radians();
    let lng1 = lng.to_radians();
    let bearing = bearing_deg.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    (lat2.to_degrees(), lng2.to_degrees())
}

/// Builds the four-corner view cone `[origin, left, centre, right]` as `(lat, lng)` pairs.
///
/// A zero `fov_deg` collapses left, centre and right onto one point, which yields a line.
pub fn field_of_view_polygon(
    lat: f64,
    lng: f64,
    bearing_deg: f64,
    fov_deg: f64,
    distance_m: f64,
) -> [(f64, f64); 4] {
    let half = fov_deg / 2.0;
    [
        (lat, lng),
        destination_point(lat, lng, bearing_deg - half, distance_m),
        destination_point(lat, lng, bearing_deg, distance_m),
        destination_point(lat, lng, bearing_deg + half, distance_m),
    ]
}

/// Folds any finite bearing into `[0, 359.9]`.
pub fn normalize_bearing(bearing_deg: f64) -> Option<f64> {
    if !bearing_deg.is_finite() {
        return None;
    }
    Some(bearing_deg.rem_euclid(360.0).min(MAX_BEARING))
}

pub fn is_valid_lat_lng(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn test_destination_point_reciprocal_round_trip() {
        let origins = [
            (0.0, 0.0),
            (52.379_189, 4.899_431),
            (-33.8688, 151.2093),
            (60.0, -179.99),
            (-60.0, 179.5),
            (25.04, 121.56),
        ];
        for (lat, lng) in origins {
            for bearing in [0.0, 45.0, 90.0, 135.0, 180.0, 271.3, 359.9] {
                let (lat2, lng2) = destination_point(lat, lng, bearing, 80.0);
                let (lat3, lng3) = destination_point(lat2, lng2, bearing + 180.0, 80.0);
                let mut dlng = (lng3 - lng).abs();
                if dlng > 180.0 {
                    dlng = 360.0 - dlng;
                }
                assert!(
                    (lat3 - lat).abs() < EPS && dlng < EPS,
                    "Round trip from ({lat}, {lng}) at bearing {bearing} ended at ({lat3}, {lng3})"
                );
            }
        }
    }

    #[test]
    fn test_destination_point_due_north() {
        let (lat, lng) = destination_point(0.0, 0.0, 0.0, 1000.0);
        let expected_lat = (1000.0 / EARTH_RADIUS_M).to_degrees();
        assert!((lat - expected_lat).abs() < 1e-12, "Latitude was {lat}");
        assert!(lng.abs() < 1e-12, "Longitude should not move, got {lng}");
    }

    #[test]
    fn test_destination_point_nan_propagates() {
        let (lat, lng) = destination_point(f64::NAN, 0.0, 10.0, 80.0);
        assert!(lat.is_nan() && lng.is_nan());
    }

    #[test]
    fn test_field_of_view_polygon_shape() {
        let polygon = field_of_view_polygon(25.0, 121.5, 90.0, 60.0, 80.0);
        assert_eq!(polygon.len(), 4);
        assert_eq!(polygon[0], (25.0, 121.5), "First point must be the origin");

        // Centre point lies due east of the origin.
        assert!((polygon[2].0 - 25.0).abs() < 1e-6);
        assert!(polygon[2].1 > 121.5);
        // Left edge points north-east, right edge south-east.
        assert!(polygon[1].0 > 25.0);
        assert!(polygon[3].0 < 25.0);
    }

    #[test]
    fn test_field_of_view_polygon_zero_fov_collapses() {
        let polygon = field_of_view_polygon(10.0, 10.0, 45.0, 0.0, 60.0);
        assert_eq!(polygon[1], polygon[2]);
        assert_eq!(polygon[2], polygon[3]);
        assert_ne!(polygon[0], polygon[2]);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(0.0), Some(0.0));
        assert_eq!(normalize_bearing(360.0), Some(0.0));
        assert_eq!(normalize_bearing(-90.0), Some(270.0));
        assert_eq!(normalize_bearing(359.95), Some(359.9));
        assert_eq!(normalize_bearing(725.0), Some(5.0));
        assert_eq!(normalize_bearing(f64::NAN), None);
    }

    #[test]
    fn test_is_valid_lat_lng() {
        assert!(is_valid_lat_lng(90.0, 180.0));
        assert!(is_valid_lat_lng(-90.0, -180.0));
        assert!(!is_valid_lat_lng(90.5, 10.0));
        assert!(!is_valid_lat_lng(0.0, 180.1));
        assert!(!is_valid_lat_lng(f64::INFINITY, 0.0));
    }
}
