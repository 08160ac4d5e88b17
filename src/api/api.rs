use std::sync::{Arc, OnceLock};

use anyhow::Result;
use chrono::Utc;

use crate::calories::{self, RiderProfile};
use crate::framing::{FramingResult, Viewport};
use crate::framing_manager::FramingManager;
use crate::main_db::Setting;
use crate::storage::Storage;
use crate::track::{FlaggedTimestamp, TrackPoint};
use crate::trip::{Trip, TripStats};
use crate::utils::Unit;
use crate::{archive, logs};

struct MainState {
    storage: Arc<Storage>,
    framing_manager: FramingManager<Arc<Storage>>,
    cache_dir: String,
}

static MAIN_STATE: OnceLock<MainState> = OnceLock::new();

pub fn init(support_dir: String, cache_dir: String) -> Result<()> {
    if MAIN_STATE.get().is_some() {
        warn!("`init` is called multiple times");
        return Ok(());
    }

    // init logging, the user may have turned it off so we check again once
    // the db is open
    if let Err(e) = logs::init(&cache_dir) {
        warn!("failed to initialize logging: {}", e);
    }

    let storage = Arc::new(Storage::init(support_dir)?);
    logs::set_enabled(storage.get_setting_with_default(Setting::LoggingEnabled, true));

    let state = MainState {
        framing_manager: FramingManager::new(storage.clone()),
        storage,
        cache_dir,
    };
    if MAIN_STATE.set(state).is_err() {
        warn!("`init` is called multiple times");
    } else {
        info!("initialized");
    }
    Ok(())
}

fn get() -> Result<&'static MainState> {
    MAIN_STATE
        .get()
        .ok_or_else(|| anyhow!("main state is not initialized"))
}

pub fn start_trip() -> Result<String> {
    let state = get()?;
    let trip = Trip::new(uuid::Uuid::new_v4().as_hyphenated().to_string(), Utc::now());
    state.storage.with_db_txn(|txn| txn.insert_trip(&trip))?;
    info!("trip started: id={}", trip.id);
    Ok(trip.id)
}

pub fn record_track_point(trip_id: String, track_point: TrackPoint) -> Result<()> {
    let state = get()?;
    state.storage.with_db_txn(|txn| {
        txn.append_track_point(&trip_id, &track_point)?;
        txn.clear_framing(&trip_id)
    })?;
    state.framing_manager.invalidate_trip(&trip_id);
    Ok(())
}

pub fn flag_timestamp(trip_id: String, flag: FlaggedTimestamp) -> Result<()> {
    get()?
        .storage
        .with_db_txn(|txn| txn.insert_flagged_timestamp(&trip_id, &flag))
}

pub fn unflag_timestamp(trip_id: String, timestamp_ms: i64) -> Result<()> {
    get()?
        .storage
        .with_db_txn(|txn| txn.delete_flagged_timestamp(&trip_id, timestamp_ms))
}

pub fn get_flagged_timestamps(trip_id: String) -> Result<Vec<FlaggedTimestamp>> {
    get()?
        .storage
        .with_db_txn(|txn| txn.get_flagged_timestamps(&trip_id))
}

// Computes the stats of the whole trip and stores them. Can be called again
// if more points are recorded afterwards, the framing is then recomputed on
// the next `get_framing`.
pub fn finish_trip(trip_id: String) -> Result<Trip> {
    let state = get()?;
    let rider_profile = state.storage.rider_profile();
    let trip = state.storage.with_db_txn(|txn| {
        let trip = match txn.get_trip(&trip_id)? {
            None => bail!("Failed to find trip with id = {}", trip_id),
            Some(trip) => trip,
        };
        let track_points = txn.get_track_points(&trip_id)?;
        let stats = TripStats::of_track_points(trip.start_time, &track_points);
        let calories_burned = rider_profile.as_ref().map(|profile| {
            let elevation_gain = stats
                .elevation_gain_barometer
                .or(stats.elevation_gain_location)
                .unwrap_or(0.0);
            calories::estimate_calories(
                stats.average_speed_kmh(),
                stats.duration_sec as f64,
                elevation_gain,
                profile,
            )
        });
        txn.update_trip_stats(&trip_id, &stats, calories_burned)?;
        txn.clear_framing(&trip_id)?;
        match txn.get_trip(&trip_id)? {
            None => bail!("Failed to find trip with id = {}", trip_id),
            Some(trip) => Ok(trip),
        }
    })?;
    state.framing_manager.invalidate_trip(&trip_id);
    info!(
        "trip finished: id={}, distance_km={}, duration_sec={}",
        trip.id, trip.distance_km, trip.duration_sec
    );
    Ok(trip)
}

pub fn delete_trip(trip_id: String) -> Result<()> {
    let state = get()?;
    state.storage.with_db_txn(|txn| txn.delete_trip(&trip_id))?;
    state.framing_manager.invalidate_trip(&trip_id);
    Ok(())
}

pub fn list_trips() -> Result<Vec<Trip>> {
    get()?.storage.with_db_txn(|txn| txn.list_all_trips())
}

pub fn get_trip(trip_id: String) -> Result<Option<Trip>> {
    get()?.storage.with_db_txn(|txn| txn.get_trip(&trip_id))
}

pub fn get_track_points(trip_id: String) -> Result<Vec<TrackPoint>> {
    get()?.storage.with_db_txn(|txn| txn.get_track_points(&trip_id))
}

pub fn get_framing(trip_id: String, viewport: Viewport) -> Result<FramingResult> {
    let state = get()?;
    let distance_km = match state.storage.with_db_txn(|txn| txn.get_trip(&trip_id))? {
        None => bail!("Failed to find trip with id = {}", trip_id),
        Some(trip) => trip.distance_km,
    };
    state
        .framing_manager
        .get_framing(&trip_id, distance_km, viewport)
}

pub fn clear_all_framings() -> Result<()> {
    get()?.framing_manager.clear_all_framings()
}

pub fn get_unit() -> Result<Unit> {
    Ok(get()?
        .storage
        .get_setting_with_default(Setting::Unit, Unit::Metric))
}

pub fn set_unit(unit: Unit) -> Result<()> {
    get()?.storage.set_setting(Setting::Unit, unit)
}

pub fn get_logging_enabled() -> bool {
    logs::is_enabled()
}

pub fn set_logging_enabled(enabled: bool) -> Result<()> {
    get()?.storage.set_setting(Setting::LoggingEnabled, enabled)?;
    if enabled {
        logs::set_enabled(true);
        info!("logging enabled");
    } else {
        info!("logging disabled");
        logs::set_enabled(false);
    }
    Ok(())
}

pub fn get_rider_profile() -> Result<Option<RiderProfile>> {
    Ok(get()?.storage.rider_profile())
}

pub fn set_rider_profile(profile: RiderProfile) -> Result<()> {
    let storage = &get()?.storage;
    storage.set_setting(Setting::RiderWeightKg, profile.weight_kg)?;
    match profile.age_years {
        None => storage.clear_setting(Setting::RiderAgeYears)?,
        Some(age) => storage.set_setting(Setting::RiderAgeYears, age)?,
    }
    match profile.height_cm {
        None => storage.clear_setting(Setting::RiderHeightCm)?,
        Some(height) => storage.set_setting(Setting::RiderHeightCm, height)?,
    }
    match profile.sex {
        None => storage.clear_setting(Setting::RiderSex)?,
        Some(sex) => storage.set_setting(Setting::RiderSex, sex)?,
    }
    match profile.bike_type {
        None => storage.clear_setting(Setting::BikeType)?,
        Some(bike_type) => storage.set_setting(Setting::BikeType, bike_type)?,
    }
    Ok(())
}

pub fn export_archive(target_filepath: String) -> Result<usize> {
    get()?
        .storage
        .with_db_txn(|txn| archive::export_archive_file(txn, &target_filepath))
}

pub fn import_archive(zip_file_path: String) -> Result<usize> {
    get()?
        .storage
        .with_db_txn(|txn| archive::import_archive_file(txn, &zip_file_path))
}

pub fn export_logs(target_file_path: String) -> Result<()> {
    logs::export(&get()?.cache_dir, &target_file_path)
}
