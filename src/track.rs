use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

// One GPS sample of a trip. Everything except the position is optional
// because not every device reports barometer or heading data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
    // km/h
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub avg_speed: f64,
    pub altitude_barometer: Option<f64>,
    pub altitude_location: Option<f64>,
    pub barometric_pressure: Option<f64>,
    pub heading: Option<f64>,
}

impl TrackPoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedTimestamp {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub latitude: f64,
    pub longitude: f64,
}
