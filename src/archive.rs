use anyhow::Result;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{Read, Seek, Write},
};

use crate::{
    framing::Framing,
    main_db,
    track::{FlaggedTimestamp, GeoPoint, TrackPoint},
    trip::Trip,
};

/* The exchange format for trips, shared with older versions of the app.
   It is a zip file with one folder per trip:
     <trip_id>/trip_data.json
     <trip_id>/tracking_points.json
     <trip_id>/flagged_timestamps.json
   Timestamps are ms since epoch and all keys are camelCase. The stored
   altitude is not exported, it is recomputed from the framing when the trip
   is shown.

   Importing never reuses the ids in the archive, every trip gets a new one,
   so importing the same archive twice gives duplicated trips.
*/

const TRIP_DATA_FILE: &str = "trip_data.json";
const TRACKING_POINTS_FILE: &str = "tracking_points.json";
const FLAGGED_TIMESTAMPS_FILE: &str = "flagged_timestamps.json";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteDimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub elevation_gain_barometer: Option<f64>,
    #[serde(default)]
    pub elevation_gain_location: Option<f64>,
    #[serde(default)]
    pub calories_burned: Option<f64>,
    #[serde(default)]
    pub rotation_angle: Option<f64>,
    #[serde(default)]
    pub route_dimensions: Option<RouteDimensions>,
    #[serde(default)]
    pub map_center: Option<GeoPoint>,
}

impl TripData {
    fn of_trip(trip: &Trip) -> Self {
        let framing = trip.framing.as_ref();
        TripData {
            id: trip.id.clone(),
            start_time: trip.start_time.timestamp_millis(),
            end_time: trip.end_time.timestamp_millis(),
            distance: trip.distance_km,
            duration: trip.duration_sec,
            max_speed: trip.max_speed,
            elevation_gain_barometer: trip.elevation_gain_barometer,
            elevation_gain_location: trip.elevation_gain_location,
            calories_burned: trip.calories_burned,
            rotation_angle: framing.map(|x| x.rotation_angle),
            route_dimensions: framing.map(|x| RouteDimensions {
                width: x.width,
                height: x.height,
            }),
            map_center: framing.map(|x| x.center),
        }
    }

    // `None` for a trip without valid timestamps.
    fn to_trip(&self, id: String) -> Option<Trip> {
        if self.start_time <= 0 || self.end_time <= 0 {
            return None;
        }
        let start_time = DateTime::from_timestamp_millis(self.start_time)?;
        let end_time = DateTime::from_timestamp_millis(self.end_time)?;
        // a partial framing is as good as none, it will be recomputed
        let framing = match (self.rotation_angle, self.route_dimensions, self.map_center) {
            (Some(rotation_angle), Some(dimensions), Some(center)) => Some(Framing {
                rotation_angle,
                width: dimensions.width,
                height: dimensions.height,
                center,
            }),
            _ => None,
        }
        .filter(Framing::is_usable);
        Some(Trip {
            id,
            start_time,
            end_time,
            duration_sec: self.duration,
            distance_km: self.distance,
            max_speed: self.max_speed,
            elevation_gain_barometer: self.elevation_gain_barometer,
            elevation_gain_location: self.elevation_gain_location,
            calories_burned: self.calories_burned,
            framing,
            map_altitude: None,
        })
    }
}

pub fn export_archive<W: Write + Seek>(txn: &mut main_db::Txn, writer: W) -> Result<usize> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let trips = txn.list_all_trips()?;
    for trip in &trips {
        zip.start_file(format!("{}/{}", trip.id, TRIP_DATA_FILE), options)?;
        serde_json::to_writer_pretty(&mut zip, &TripData::of_trip(trip))?;

        zip.start_file(format!("{}/{}", trip.id, TRACKING_POINTS_FILE), options)?;
        serde_json::to_writer(&mut zip, &txn.get_track_points(&trip.id)?)?;

        zip.start_file(format!("{}/{}", trip.id, FLAGGED_TIMESTAMPS_FILE), options)?;
        serde_json::to_writer(&mut zip, &txn.get_flagged_timestamps(&trip.id)?)?;
    }
    zip.finish()?;
    info!("[archive] exported {} trips", trips.len());
    Ok(trips.len())
}

pub fn export_archive_file(txn: &mut main_db::Txn, zip_file_path: &str) -> Result<usize> {
    export_archive(txn, File::create(zip_file_path)?)
}

fn read_json<R: Read + Seek, T: for<'de> Deserialize<'de>>(
    zip: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Option<T>> {
    let mut file = match zip.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    match serde_json::from_str(&content) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!("[archive] skipping {}, invalid json: {}", name, e);
            Ok(None)
        }
    }
}

/// Imports all trips in the archive and returns the number of imported trips.
/// Broken entries are skipped, but any database error aborts the whole import.
pub fn import_archive<R: Read + Seek>(txn: &mut main_db::Txn, reader: R) -> Result<usize> {
    let mut zip = zip::ZipArchive::new(reader)?;
    let trip_files: Vec<String> = zip
        .file_names()
        .filter(|name| {
            *name == TRIP_DATA_FILE || name.ends_with(&format!("/{}", TRIP_DATA_FILE))
        })
        .map(|name| name.to_string())
        .collect();

    let mut imported = 0;
    for trip_file in trip_files {
        let trip_data: TripData = match read_json(&mut zip, &trip_file)? {
            None => continue,
            Some(trip_data) => trip_data,
        };
        let new_id = uuid::Uuid::new_v4().as_hyphenated().to_string();
        let trip = match trip_data.to_trip(new_id) {
            None => {
                warn!(
                    "[archive] invalid timestamps in {}, skipping trip",
                    trip_file
                );
                continue;
            }
            Some(trip) => trip,
        };
        txn.insert_trip(&trip)?;

        let prefix = &trip_file[..trip_file.len() - TRIP_DATA_FILE.len()];
        let track_points: Vec<TrackPoint> =
            read_json(&mut zip, &format!("{}{}", prefix, TRACKING_POINTS_FILE))?
                .unwrap_or_default();
        for point in &track_points {
            txn.append_track_point(&trip.id, point)?;
        }
        let flags: Vec<FlaggedTimestamp> =
            read_json(&mut zip, &format!("{}{}", prefix, FLAGGED_TIMESTAMPS_FILE))?
                .unwrap_or_default();
        for flag in &flags {
            txn.insert_flagged_timestamp(&trip.id, flag)?;
        }
        debug!(
            "[archive] imported trip {} as {}, points={}, flags={}",
            trip_data.id,
            trip.id,
            track_points.len(),
            flags.len()
        );
        imported += 1;
    }
    info!("[archive] imported {} trips", imported);
    Ok(imported)
}

pub fn import_archive_file(txn: &mut main_db::Txn, zip_file_path: &str) -> Result<usize> {
    import_archive(txn, File::open(zip_file_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_trip_data() {
        let trip_data: TripData = serde_json::from_str(
            r#"{"startTime": 1700000000000, "endTime": 1700000600000, "distance": 3.5,
                "duration": 600, "maxSpeed": 25.0, "rotationAngle": 12.0}"#,
        )
        .unwrap();
        let trip = trip_data.to_trip("new".to_string()).unwrap();
        assert_eq!(trip.id, "new");
        assert_eq!(trip.duration_sec, 600);
        assert_eq!(trip.framing, None);
        assert_eq!(trip.elevation_gain_barometer, None);
    }

    #[test]
    fn invalid_timestamps() {
        let trip_data: TripData =
            serde_json::from_str(r#"{"startTime": 0, "endTime": 1700000600000}"#).unwrap();
        assert!(trip_data.to_trip("new".to_string()).is_none());
    }

    #[test]
    fn complete_framing() {
        let trip_data: TripData = serde_json::from_str(
            r#"{"startTime": 1, "endTime": 2, "rotationAngle": -30.0,
                "routeDimensions": {"width": 0.1, "height": 0.05},
                "mapCenter": {"latitude": 40.0, "longitude": -74.0}}"#,
        )
        .unwrap();
        let framing = trip_data.to_trip("new".to_string()).unwrap().framing.unwrap();
        assert_eq!(framing.rotation_angle, -30.0);
        assert_eq!(framing.width, 0.1);
        assert_eq!(framing.center, GeoPoint::new(40.0, -74.0));
    }
}
