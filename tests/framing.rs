pub mod test_utils;

#[macro_use]
extern crate assert_float_eq;

use rand::{rngs::StdRng, Rng, SeedableRng};
use ridelog_core::framing::{
    self, compute_altitude, compute_framing, rotate_point, BoundingBox, FramingError,
    FramingResult, FramingSource, Viewport, DEFAULT_ALTITUDE, DEFAULT_CENTER,
    SINGLE_POINT_ALTITUDE,
};
use ridelog_core::track::GeoPoint;

fn portrait() -> Viewport {
    Viewport::new(400, 120, false)
}

fn random_track(seed: u64, n: usize) -> Vec<GeoPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            GeoPoint::new(
                48.8566 + rng.random_range(-0.03..0.03),
                2.3522 + rng.random_range(-0.05..0.05),
            )
        })
        .collect()
}

#[test]
fn empty_track() {
    let result = compute_framing(&[], 12.0, &portrait(), None).unwrap();
    assert_eq!(result, FramingResult::default_view());
    assert_eq!(result.center, DEFAULT_CENTER);
    assert_eq!(result.altitude, DEFAULT_ALTITUDE);
    assert_eq!(result.rotation_angle, 0.0);
    assert_eq!(result.source, FramingSource::Default);
}

#[test]
fn short_distance() {
    let track = random_track(1, 20);
    for distance_km in [0.0, 0.05, 0.1] {
        let result = compute_framing(&track, distance_km, &portrait(), None).unwrap();
        assert_eq!(result.center, track[0]);
        assert_eq!(result.altitude, SINGLE_POINT_ALTITUDE);
        assert_eq!(result.rotation_angle, 0.0);
        assert_eq!(result.source, FramingSource::SinglePoint);
    }
}

#[test]
fn single_point() {
    let track = [GeoPoint::new(35.6762, 139.6503)];
    let result = compute_framing(&track, 5.0, &portrait(), None).unwrap();
    assert_eq!(result, FramingResult::single_point(track[0]));
}

#[test]
fn all_points_identical() {
    let track = vec![GeoPoint::new(35.6762, 139.6503); 10];
    let result = compute_framing(&track, 5.0, &portrait(), None).unwrap();
    assert_eq!(result.source, FramingSource::SinglePoint);
    assert_eq!(result.center, track[0]);
}

#[test]
fn invalid_points() {
    let viewport = portrait();
    let pole = [GeoPoint::new(10.0, 10.0), GeoPoint::new(90.0, 10.0)];
    assert!(matches!(
        compute_framing(&pole, 5.0, &viewport, None),
        Err(FramingError::InvalidTrackData(_))
    ));
    let out_of_range = [GeoPoint::new(10.0, 10.0), GeoPoint::new(10.0, 181.0)];
    assert!(matches!(
        compute_framing(&out_of_range, 5.0, &viewport, None),
        Err(FramingError::InvalidTrackData(_))
    ));
    let track = random_track(2, 10);
    assert!(matches!(
        compute_framing(&track, f64::INFINITY, &viewport, None),
        Err(FramingError::InvalidTrackData(_))
    ));
}

#[test]
fn circle_with_square_viewport() {
    let center = GeoPoint::new(45.0, 7.0);
    let track = test_utils::circle(center, 0.01, 360);
    let viewport = Viewport::new(300, 300, true);

    let search = framing::find_best_rotation(&track, &center, viewport.aspect_ratio()).unwrap();
    assert_eq!(search.angle, 0);
    assert!(search.aspect_ratio_diff < 1e-9);

    let result = compute_framing(&track, test_utils::distance_km(&track), &viewport, None).unwrap();
    assert_eq!(result.source, FramingSource::Computed);
    // width and height are equal up to rounding, so either side may win
    assert!(result.rotation_angle == 0.0 || result.rotation_angle == -90.0);
    assert_float_absolute_eq!(result.width, 0.02, 1e-9);
    assert_float_absolute_eq!(result.height, 0.02, 1e-9);
    assert_float_absolute_eq!(result.center.latitude, 45.0, 1e-9);
    assert_float_absolute_eq!(result.center.longitude, 7.0, 1e-9);
}

#[test]
fn rotation_follows_box_orientation() {
    for seed in 0..10 {
        let track = random_track(seed, 50);
        for viewport in [portrait(), Viewport::new(900, 400, true)] {
            let result = compute_framing(&track, 10.0, &viewport, None).unwrap();
            assert_eq!(result.source, FramingSource::Computed);
            assert!(result.rotation_angle >= -90.0 && result.rotation_angle <= 90.0);
            if result.height > result.width {
                assert!(result.rotation_angle >= 0.0);
            } else {
                assert!(result.rotation_angle <= 0.0);
            }
            assert!(result.width > 0.0 && result.height > 0.0);
            assert_eq!(
                result.altitude,
                compute_altitude(
                    result.width,
                    result.height,
                    viewport.width_px as f64,
                    viewport.height_px as f64,
                    viewport.is_landscape
                )
            );
        }
    }
}

#[test]
fn rotated_box_fits_viewport_best() {
    let track = random_track(3, 80);
    let viewport = portrait();
    let centroid = BoundingBox::of_points(track.iter().copied()).center();
    let search = framing::find_best_rotation(&track, &centroid, viewport.aspect_ratio()).unwrap();
    assert!(search.angle <= framing::MAX_SEARCH_ANGLE);
    for angle in 0..=framing::MAX_SEARCH_ANGLE {
        let bbox = BoundingBox::of_points(
            track
                .iter()
                .map(|point| rotate_point(point, angle as f64, &centroid)),
        );
        let diff = (bbox.aspect_ratio() - viewport.aspect_ratio()).abs();
        assert!(search.aspect_ratio_diff <= diff);
        if angle < search.angle {
            // the first best angle wins
            assert!(search.aspect_ratio_diff < diff);
        }
    }
}

#[test]
fn deterministic() {
    let track = random_track(42, 200);
    let viewport = Viewport::new(390, 140, false);
    let first = compute_framing(&track, 8.0, &viewport, None).unwrap();
    for _ in 0..3 {
        assert_eq!(compute_framing(&track, 8.0, &viewport, None).unwrap(), first);
    }
}

#[test]
fn cached_framing_only_updates_altitude() {
    let track = random_track(5, 60);
    let first = compute_framing(&track, 9.0, &portrait(), None).unwrap();
    assert_eq!(first.source, FramingSource::Computed);

    let landscape = Viewport::new(844, 390, true);
    let cached = first.framing();
    let second = compute_framing(&track, 9.0, &landscape, Some(&cached)).unwrap();
    assert_eq!(second.source, FramingSource::Cached);
    assert_eq!(second.framing(), cached);
    assert_eq!(
        second.altitude,
        compute_altitude(cached.width, cached.height, 844.0, 390.0, true)
    );
    assert_ne!(second.altitude, first.altitude);

    // the stored framing is used as is, even for a different track
    let other_track = random_track(6, 60);
    let third = compute_framing(&other_track, 9.0, &portrait(), Some(&cached)).unwrap();
    assert_eq!(third.framing(), cached);
    assert_eq!(third.altitude, first.altitude);
}

#[test]
fn incomplete_cached_framing_is_recomputed() {
    let track = random_track(7, 60);
    let mut cached = compute_framing(&track, 9.0, &portrait(), None)
        .unwrap()
        .framing();
    cached.width = f64::NAN;
    let result = compute_framing(&track, 9.0, &portrait(), Some(&cached)).unwrap();
    assert_eq!(result.source, FramingSource::Computed);
    assert!(result.width.is_finite());
}

#[test]
fn rotate_round_trip() {
    let center = GeoPoint::new(-33.8688, 151.2093);
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..100 {
        let point = GeoPoint::new(
            center.latitude + rng.random_range(-0.5..0.5),
            center.longitude + rng.random_range(-0.5..0.5),
        );
        let angle = rng.random_range(-180.0..180.0);
        let back = rotate_point(&rotate_point(&point, angle, &center), -angle, &center);
        assert_float_absolute_eq!(back.latitude, point.latitude, 1e-9);
        assert_float_absolute_eq!(back.longitude, point.longitude, 1e-9);
    }
    let same = rotate_point(&center, 33.0, &center);
    assert_float_absolute_eq!(same.latitude, center.latitude, 1e-9);
    assert_float_absolute_eq!(same.longitude, center.longitude, 1e-9);
}

#[test]
fn small_square_in_portrait_viewport() {
    let track = test_utils::square(GeoPoint::new(40.7128, -74.006), 0.0005);
    let distance_km = test_utils::distance_km(&track);
    assert!(distance_km > framing::MIN_DISTANCE_KM);

    let result = compute_framing(&track, distance_km, &portrait(), None).unwrap();
    assert_eq!(result.source, FramingSource::Computed);
    // too small to matter, the altitude floor kicks in
    assert_eq!(result.altitude, 500.0);
    assert_float_absolute_eq!(result.center.latitude, 40.71305, 1e-5);
    assert_float_absolute_eq!(result.center.longitude, -74.00575, 1e-5);
}

#[test]
fn square_in_portrait_viewport() {
    let track = test_utils::square(GeoPoint::new(40.0, -74.0), 0.01);
    let viewport = portrait();

    // no angle gets close to 400/120, the square on its side is the closest
    let centroid = BoundingBox::of_points(track.iter().copied()).center();
    let search = framing::find_best_rotation(&track, &centroid, viewport.aspect_ratio()).unwrap();
    assert_eq!(search.angle, 90);

    let result = compute_framing(&track, 2.0, &viewport, None).unwrap();
    assert_eq!(result.source, FramingSource::Computed);
    // wider than tall after the search
    assert_eq!(result.rotation_angle, 0.0);
    assert_float_absolute_eq!(result.width, 0.013055, 1e-5);
    assert_float_absolute_eq!(result.height, 0.007660, 1e-5);
    assert_float_absolute_eq!(result.center.latitude, 40.005, 1e-6);
    assert_float_absolute_eq!(result.center.longitude, -73.995, 1e-6);
    // 0.013 degrees is about 1450 m, well above the 500 m floor
    assert_float_absolute_eq!(result.altitude, 1453.28, 0.01);
    assert_eq!(
        result.altitude,
        compute_altitude(result.width, result.height, 400.0, 120.0, false)
    );
}
