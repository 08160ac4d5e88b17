use std::f64::consts::PI;

use itertools::Itertools;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::track::GeoPoint;

// Half of the earth circumference used by EPSG:3857, in meters.
// https://epsg.io/3857
pub const WEB_MERCATOR_HALF_EXTENT: f64 = 20037508.34;
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_TO_MILES: f64 = 0.621371;

// https://wiki.openstreetmap.org/wiki/Mercator
pub fn lng_lat_to_web_mercator(lng: f64, lat: f64) -> (f64, f64) {
    let x = (lng * WEB_MERCATOR_HALF_EXTENT) / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    let y = (y * WEB_MERCATOR_HALF_EXTENT) / 180.0;
    (x, y)
}

pub fn web_mercator_to_lng_lat(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / WEB_MERCATOR_HALF_EXTENT) * 180.0;
    let lat = (y / WEB_MERCATOR_HALF_EXTENT) * 180.0;
    let lat = (180.0 / PI) * (2.0 * (lat * PI / 180.0).exp().atan() - PI / 2.0);
    (lng, lat)
}

// Great circle distance, unit: km.
pub fn haversine_distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn track_distance_km<'a>(points: impl IntoIterator<Item = &'a GeoPoint>) -> f64 {
    points
        .into_iter()
        .tuple_windows()
        .map(|(a, b)| haversine_distance_km(a, b))
        .sum()
}

pub fn km_to_miles(km: f64) -> f64 {
    km * KM_TO_MILES
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Unit {
    Metric,
    Imperial,
}

impl Unit {
    // distances are always stored in km
    pub fn distance_from_km(self, km: f64) -> f64 {
        match self {
            Self::Metric => km,
            Self::Imperial => km_to_miles(km),
        }
    }
}
