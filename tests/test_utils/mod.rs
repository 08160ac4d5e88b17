use ridelog_core::track::{GeoPoint, TrackPoint};
use ridelog_core::utils;
use std::fs;
use tempdir::TempDir;

pub const START_TIMESTAMP_MS: i64 = 1_700_000_000_000;

// `n` points on a circle of `radius_deg` degrees around `center`, starting
// east of the center and going counterclockwise.
pub fn circle(center: GeoPoint, radius_deg: f64, n: usize) -> Vec<GeoPoint> {
    (0..n)
        .map(|i| {
            let rad = (i as f64 * 360.0 / n as f64).to_radians();
            GeoPoint::new(
                center.latitude + radius_deg * rad.sin(),
                center.longitude + radius_deg * rad.cos(),
            )
        })
        .collect()
}

// Closed loop around a square, the first point is repeated at the end.
pub fn square(south_west: GeoPoint, side_deg: f64) -> Vec<GeoPoint> {
    let GeoPoint {
        latitude,
        longitude,
    } = south_west;
    vec![
        GeoPoint::new(latitude, longitude),
        GeoPoint::new(latitude + side_deg, longitude),
        GeoPoint::new(latitude + side_deg, longitude + side_deg),
        GeoPoint::new(latitude, longitude + side_deg),
        GeoPoint::new(latitude, longitude),
    ]
}

pub fn sample_ride(n: usize) -> Vec<TrackPoint> {
    sample_ride_from(START_TIMESTAMP_MS, n)
}

// A ride heading north east with a point every 10 seconds.
pub fn sample_ride_from(start_timestamp_ms: i64, n: usize) -> Vec<TrackPoint> {
    (0..n)
        .map(|i| TrackPoint {
            timestamp_ms: start_timestamp_ms + i as i64 * 10_000,
            latitude: 31.2304 + i as f64 * 0.0009,
            longitude: 121.4737 + i as f64 * 0.0003 + (i % 4) as f64 * 0.0002,
            speed: 20.0 + (i % 5) as f64,
            max_speed: 24.0,
            avg_speed: 21.0,
            altitude_barometer: Some(10.0 + (i % 7) as f64),
            altitude_location: None,
            barometric_pressure: Some(1013.0),
            heading: Some(18.0),
        })
        .collect()
}

pub fn distance_km(track: &[GeoPoint]) -> f64 {
    utils::track_distance_km(track)
}

pub fn sub_folder(temp_dir: &TempDir, sub: &str) -> String {
    let path = temp_dir.path().join(sub);
    fs::create_dir(&path).unwrap();
    path.into_os_string().into_string().unwrap()
}
