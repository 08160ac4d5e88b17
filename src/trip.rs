use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::framing::Framing;
use crate::track::{GeoPoint, TrackPoint};
use crate::utils;

#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_sec: i64,
    pub distance_km: f64,
    pub max_speed: f64,
    pub elevation_gain_barometer: Option<f64>,
    pub elevation_gain_location: Option<f64>,
    pub calories_burned: Option<f64>,
    // `None` until the trip has been shown once, see `framing_manager`.
    pub framing: Option<Framing>,
    pub map_altitude: Option<f64>,
}

impl Trip {
    pub fn new(id: String, start_time: DateTime<Utc>) -> Self {
        Trip {
            id,
            start_time,
            end_time: start_time,
            duration_sec: 0,
            distance_km: 0.0,
            max_speed: 0.0,
            elevation_gain_barometer: None,
            elevation_gain_location: None,
            calories_burned: None,
            framing: None,
            map_altitude: None,
        }
    }

    pub fn average_speed_kmh(&self) -> f64 {
        average_speed_kmh(self.distance_km, self.duration_sec)
    }
}

fn average_speed_kmh(distance_km: f64, duration_sec: i64) -> f64 {
    if duration_sec <= 0 {
        0.0
    } else {
        distance_km / (duration_sec as f64 / 3600.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TripStats {
    pub end_time: DateTime<Utc>,
    pub duration_sec: i64,
    pub distance_km: f64,
    pub max_speed: f64,
    pub elevation_gain_barometer: Option<f64>,
    pub elevation_gain_location: Option<f64>,
}

// Sum of all climbs, descents are ignored. `None` if the sensor never
// reported anything.
fn elevation_gain(altitudes: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let altitudes: Vec<f64> = altitudes.flatten().collect();
    if altitudes.is_empty() {
        return None;
    }
    Some(
        altitudes
            .iter()
            .tuple_windows()
            .map(|(prev, curr)| (curr - prev).max(0.0))
            .sum(),
    )
}

impl TripStats {
    pub fn of_track_points(start_time: DateTime<Utc>, track_points: &[TrackPoint]) -> Self {
        let points: Vec<GeoPoint> = track_points.iter().map(TrackPoint::point).collect();
        let end_time = track_points
            .last()
            .and_then(|point| DateTime::from_timestamp_millis(point.timestamp_ms))
            .unwrap_or(start_time);
        TripStats {
            end_time,
            duration_sec: (end_time - start_time).num_seconds().max(0),
            distance_km: utils::track_distance_km(&points),
            max_speed: track_points
                .iter()
                .map(|point| point.speed)
                .fold(0.0, f64::max),
            elevation_gain_barometer: elevation_gain(
                track_points.iter().map(|point| point.altitude_barometer),
            ),
            elevation_gain_location: elevation_gain(
                track_points.iter().map(|point| point.altitude_location),
            ),
        }
    }

    pub fn average_speed_kmh(&self) -> f64 {
        average_speed_kmh(self.distance_km, self.duration_sec)
    }
}
