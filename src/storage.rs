use anyhow::Result;
use std::str::FromStr;
use std::sync::Mutex;

use crate::calories::{BikeType, RiderProfile, Sex};
use crate::framing::{Framing, FramingResult};
use crate::framing_manager::FramingStore;
use crate::main_db::{self, MainDb, Setting};
use crate::track::TrackPoint;

pub struct Storage {
    support_dir: String,
    pub main_db: Mutex<MainDb>,
}

impl Storage {
    pub fn init(support_dir: String) -> Result<Self> {
        let main_db = MainDb::open(&support_dir)?;
        info!("[storage] initialized, support_dir={}", support_dir);
        Ok(Storage {
            support_dir,
            main_db: Mutex::new(main_db),
        })
    }

    pub fn support_dir(&self) -> &str {
        &self.support_dir
    }

    pub fn with_db_txn<F, O>(&self, f: F) -> Result<O>
    where
        F: FnOnce(&mut main_db::Txn) -> Result<O>,
    {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.with_txn(f)
    }

    pub fn get_setting_with_default<T: FromStr>(&self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.get_setting_with_default(setting, default)
    }

    pub fn set_setting<T: ToString>(&self, setting: Setting, value: T) -> Result<()> {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.set_setting(setting, value)
    }

    pub fn clear_setting(&self, setting: Setting) -> Result<()> {
        let mut main_db = self.main_db.lock().unwrap();
        main_db.clear_setting(setting)
    }

    // `None` if the user never entered a weight, we don't guess one.
    pub fn rider_profile(&self) -> Option<RiderProfile> {
        let mut main_db = self.main_db.lock().unwrap();
        let weight_kg: f64 = main_db.get_optional_setting(Setting::RiderWeightKg)?;
        if weight_kg <= 0.0 {
            return None;
        }
        Some(RiderProfile {
            weight_kg,
            age_years: main_db.get_optional_setting(Setting::RiderAgeYears),
            height_cm: main_db.get_optional_setting(Setting::RiderHeightCm),
            sex: main_db.get_optional_setting::<Sex>(Setting::RiderSex),
            bike_type: main_db.get_optional_setting::<BikeType>(Setting::BikeType),
        })
    }

    pub fn flush(&self) -> Result<()> {
        debug!("[storage] flushing");
        let main_db = self.main_db.lock().unwrap();
        main_db.flush()
    }
}

impl FramingStore for Storage {
    fn read_track_points(&self, trip_id: &str) -> Result<Vec<TrackPoint>> {
        self.with_db_txn(|txn| txn.get_track_points(trip_id))
    }

    fn read_cached_framing(&self, trip_id: &str) -> Result<Option<Framing>> {
        self.with_db_txn(|txn| txn.get_cached_framing(trip_id))
    }

    fn write_framing(&self, trip_id: &str, framing: &FramingResult) -> Result<()> {
        self.with_db_txn(|txn| txn.set_framing(trip_id, &framing.framing(), framing.altitude))
    }

    fn clear_all_framings(&self) -> Result<()> {
        self.with_db_txn(|txn| txn.clear_all_framings())
    }
}
