//! Places photos on the map by matching their capture time against timed tracks.
use crate::error::{PhotoMapError, Result};
use crate::model::{LatLng, TrackCollection};
use crate::registry::PhotoRegistry;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

/// One track vertex with its time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub at: DateTime<Utc>,
    pub position: LatLng,
}

/// A photo moved by [`align_photos`].
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPhoto {
    pub id: String,
    pub position: LatLng,
    /// Distance in time between the photo and the sample it was placed on.
    pub offset: TimeDelta,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    pub aligned: Vec<AlignedPhoto>,
    /// Photos without a capture time, left where they were.
    pub undated: usize,
}

/// Every vertex of every timed LineString, sorted by time.
///
/// The sort is stable, so samples with equal times keep their track order.
pub fn timed_samples(tracks: &TrackCollection) -> Vec<TimedSample> {
    let mut samples: Vec<TimedSample> = tracks
        .iter()
        .filter_map(|feature| feature.timed_line())
        .flat_map(|(coords, times)| coords.iter().zip(times))
        .filter_map(|(coord, &at)| {
            LatLng::new(coord.lat, coord.lng)
                .ok()
                .map(|position| TimedSample { at, position })
        })
        .collect();
    samples.sort_by_key(|sample| sample.at);
    samples
}

/// Index of the sample closest in time to `at`.
///
/// Looks at the insertion point and its two neighbours; on equal distance the earlier sample
/// wins. Returns `None` only for an empty slice.
pub fn nearest_sample(samples: &[TimedSample], at: DateTime<Utc>) -> Option<usize> {
    let last = samples.len().checked_sub(1)?;
    let insertion = samples.partition_point(|sample| sample.at < at).min(last);
    let mut candidates = vec![insertion.saturating_sub(1), insertion, (insertion + 1).min(last)];
    candidates.dedup();
    candidates
        .into_iter()
        .min_by_key(|&i| ((samples[i].at - at).abs(), i))
}

/// Moves every dated photo onto the nearest timed track sample.
///
/// Fails with [`PhotoMapError::NoTimedTracks`] before touching any photo when no track has
/// per-vertex times.
pub fn align_photos(registry: &mut PhotoRegistry, tracks: &TrackCollection) -> Result<AlignmentReport> {
    let samples = timed_samples(tracks);
    if samples.is_empty() {
        return Err(PhotoMapError::NoTimedTracks);
    }
    debug!("Aligning against {} timed samples", samples.len());

    let mut report = AlignmentReport::default();
    for photo in registry.iter_mut() {
        let Some(captured) = photo.captured_at else {
            report.undated += 1;
            continue;
        };
        let Some(best) = nearest_sample(&samples, captured) else {
            continue;
        };
        let sample = samples[best];
        photo.set_position(Some(sample.position));
        report.aligned.push(AlignedPhoto {
            id: photo.id().to_string(),
            position: sample.position,
            offset: (sample.at - captured).abs(),
        });
    }
    info!(
        "Aligned {} photos by time, {} had no capture time",
        report.aligned.len(),
        report.undated
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coord, Geometry, Photo, TrackFeature};
    use chrono::TimeZone;

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn timed_line(points: &[(i64, f64, f64)]) -> TrackFeature {
        let mut feature = TrackFeature::new(
            "track",
            Geometry::LineString(points.iter().map(|&(_, lat, lng)| Coord::new(lng, lat)).collect()),
        );
        feature.times = Some(points.iter().map(|&(s, _, _)| t(s)).collect());
        feature
    }

    fn samples(points: &[(i64, f64, f64)]) -> Vec<TimedSample> {
        timed_samples(&TrackCollection::from(vec![timed_line(points)]))
    }

    #[test]
    fn test_nearest_sample_picks_smallest_delta() {
        let samples = samples(&[(0, 0.0, 0.0), (10, 1.0, 1.0), (20, 2.0, 2.0)]);
        let best = nearest_sample(&samples, t(14)).unwrap();
        assert_eq!(samples[best].position, LatLng::new(1.0, 1.0).unwrap());
    }

    #[test]
    fn test_nearest_sample_edges_and_ties() {
        let samples = samples(&[(0, 0.0, 0.0), (10, 1.0, 1.0), (20, 2.0, 2.0)]);
        assert_eq!(nearest_sample(&samples, t(-100)), Some(0));
        assert_eq!(nearest_sample(&samples, t(500)), Some(2));
        assert_eq!(nearest_sample(&samples, t(15)), Some(1), "A tie goes to the earlier sample");
        assert_eq!(nearest_sample(&samples, t(20)), Some(2));
        assert_eq!(nearest_sample(&[], t(0)), None);
    }

    #[test]
    fn test_timed_samples_are_sorted_and_stable() {
        let tracks = TrackCollection::from(vec![
            timed_line(&[(30, 3.0, 3.0), (10, 1.0, 1.0)]),
            timed_line(&[(10, 5.0, 5.0)]),
            TrackFeature::new("untimed", Geometry::LineString(vec![Coord::new(9.0, 9.0)])),
        ]);
        let samples = timed_samples(&tracks);
        let lats: Vec<f64> = samples.iter().map(|s| s.position.lat()).collect();
        assert_eq!(lats, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn test_align_photos() {
        let mut registry = PhotoRegistry::new();
        let dated = registry.insert(Photo::builder().name("a.jpg").captured_at(t(14)).build());
        registry.insert(Photo::builder().name("b.jpg").build());
        let tracks = TrackCollection::from(vec![timed_line(&[
            (0, 0.0, 0.0),
            (10, 1.0, 1.0),
            (20, 2.0, 2.0),
        ])]);

        let report = align_photos(&mut registry, &tracks).unwrap();
        assert_eq!(report.undated, 1);
        assert_eq!(report.aligned.len(), 1);
        assert_eq!(report.aligned[0].offset, TimeDelta::seconds(4));
        assert_eq!(
            registry.get(&dated).unwrap().position(),
            Some(LatLng::new(1.0, 1.0).unwrap())
        );
    }

    #[test]
    fn test_align_without_timed_tracks() {
        let mut registry = PhotoRegistry::new();
        let id = registry.insert(Photo::builder().name("a.jpg").captured_at(t(0)).build());
        let tracks = TrackCollection::from(vec![TrackFeature::new(
            "untimed",
            Geometry::LineString(vec![Coord::new(1.0, 1.0), Coord::new(2.0, 2.0)]),
        )]);
        let err = align_photos(&mut registry, &tracks).unwrap_err();
        assert!(matches!(err, PhotoMapError::NoTimedTracks));
        assert!(registry.get(&id).unwrap().position().is_none());
    }
}
