pub mod test_utils;

use chrono::DateTime;
use ridelog_core::{
    calories::{BikeType, Sex},
    framing::{FramingSource, Viewport},
    framing_manager::{FramingManager, FramingStore},
    main_db::Setting,
    storage::Storage,
    trip::{Trip, TripStats},
};
use std::sync::Arc;
use tempdir::TempDir;

fn init_storage(temp_dir: &TempDir) -> Storage {
    Storage::init(test_utils::sub_folder(temp_dir, "support/")).unwrap()
}

fn add_trip(storage: &Storage, id: &str) -> Trip {
    let start_time = DateTime::from_timestamp_millis(test_utils::START_TIMESTAMP_MS).unwrap();
    let track_points = test_utils::sample_ride(200);
    storage
        .with_db_txn(|txn| {
            txn.insert_trip(&Trip::new(id.to_string(), start_time))?;
            for point in &track_points {
                txn.append_track_point(id, point)?;
            }
            let stats = TripStats::of_track_points(start_time, &track_points);
            txn.update_trip_stats(id, &stats, None)?;
            txn.get_trip(id)
        })
        .unwrap()
        .unwrap()
}

#[test]
fn framing_is_persisted() {
    let temp_dir = TempDir::new("storage-framing_is_persisted").unwrap();
    println!("temp dir: {:?}", temp_dir.path());
    let storage = Arc::new(init_storage(&temp_dir));
    let trip = add_trip(&storage, "trip");

    let viewport = Viewport::new(400, 120, false);
    let manager = FramingManager::new(storage.clone());
    let result = manager
        .get_framing(&trip.id, trip.distance_km, viewport)
        .unwrap();
    assert_eq!(result.source, FramingSource::Computed);

    let stored = storage.with_db_txn(|txn| txn.get_trip("trip")).unwrap().unwrap();
    assert_eq!(stored.framing, Some(result.framing()));
    assert_eq!(stored.map_altitude, Some(result.altitude));

    // a new manager (e.g. after a restart) uses the stored framing
    drop(manager);
    let manager = FramingManager::new(storage.clone());
    let again = manager
        .get_framing(&trip.id, trip.distance_km, viewport)
        .unwrap();
    assert_eq!(again.source, FramingSource::Cached);
    assert_eq!(again.framing(), result.framing());
    assert_eq!(again.altitude, result.altitude);

    manager.clear_all_framings().unwrap();
    assert_eq!(storage.read_cached_framing("trip").unwrap(), None);
}

#[test]
fn framing_of_unknown_trip() {
    let temp_dir = TempDir::new("storage-framing_of_unknown_trip").unwrap();
    let storage = init_storage(&temp_dir);
    let manager = FramingManager::new(storage);
    // no points, nothing to store
    let result = manager
        .get_framing("nope", 3.0, Viewport::new(400, 120, false))
        .unwrap();
    assert_eq!(result.source, FramingSource::Default);
}

#[test]
fn rider_profile() {
    let temp_dir = TempDir::new("storage-rider_profile").unwrap();
    let storage = init_storage(&temp_dir);
    assert_eq!(storage.rider_profile(), None);

    storage.set_setting(Setting::RiderWeightKg, 68.0).unwrap();
    storage.set_setting(Setting::RiderSex, Sex::Female).unwrap();
    storage
        .set_setting(Setting::BikeType, BikeType::MountainBike)
        .unwrap();
    storage.set_setting(Setting::RiderHeightCm, "tall").unwrap();

    let profile = storage.rider_profile().unwrap();
    assert_eq!(profile.weight_kg, 68.0);
    assert_eq!(profile.sex, Some(Sex::Female));
    assert_eq!(profile.bike_type, Some(BikeType::MountainBike));
    assert_eq!(profile.age_years, None);
    // unparsable values are ignored
    assert_eq!(profile.height_cm, None);

    storage.set_setting(Setting::RiderWeightKg, 0).unwrap();
    assert_eq!(storage.rider_profile(), None);
}
