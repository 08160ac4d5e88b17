use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::cmp::Ordering;
use std::error::Error;
use std::path::Path;
use std::str::FromStr;

use crate::framing::Framing;
use crate::track::{FlaggedTimestamp, GeoPoint, TrackPoint};
use crate::trip::{Trip, TripStats};

/* The main database.

`trips` has one row per trip, with the summary stats and the cached map
framing (rotation, route dimensions, map center and altitude). The framing
columns are all NULL until the trip is shown for the first time.

`tracking_points` and `flagged_timestamps` keep the raw samples of each trip.
Points are append only while recording and never changed afterwards, we rely
on the auto incremented `id` to keep them in order.

`setting` is a simple key value store for user preferences.
*/

fn init_metadata_and_get_version(tx: &Transaction) -> Result<i32> {
    let create_db_metadata_sql = "
    CREATE TABLE IF NOT EXISTS `db_metadata` (
	`key`	TEXT NOT NULL,
	`value`	TEXT,
	PRIMARY KEY(`key`)
    )";
    tx.execute(create_db_metadata_sql, ())?;
    let version_str: Option<String> = tx
        .query_row(
            "SELECT `value` FROM `db_metadata` WHERE key='version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(match version_str {
        None => 0,
        Some(s) => s.parse()?,
    })
}

fn set_version_in_metadata(tx: &Transaction, version: i32) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO `db_metadata` (key, value) VALUES (?1, ?2)",
        ("version", version.to_string()),
    )?;
    Ok(())
}

fn run_sql(tx: &Transaction, sql: &str) -> Result<()> {
    for s in sql_split::split(sql) {
        tx.execute(&s, ())?;
    }
    Ok(())
}

#[allow(clippy::type_complexity)]
fn open_db_and_run_migration(
    support_dir: &str,
    file_name: &str,
    migrations: &[&dyn Fn(&Transaction) -> Result<()>],
) -> Result<Connection> {
    debug!("open and run migration for {}", file_name);
    let mut conn = Connection::open(Path::new(support_dir).join(file_name))?;
    let tx = conn.transaction()?;

    let version = init_metadata_and_get_version(&tx)? as usize;
    let target_version = migrations.len();
    debug!(
        "current version = {}, target_version = {}",
        version, target_version
    );
    match version.cmp(&target_version) {
        Ordering::Equal => (),
        Ordering::Less => {
            for (i, f) in migrations.iter().enumerate().skip(version) {
                info!("running migration for version: {}", i + 1);
                f(&tx)?;
            }
            set_version_in_metadata(&tx, target_version as i32)?;
        }
        Ordering::Greater => {
            bail!(
                "version too high: current version = {}, target_version = {}",
                version,
                target_version
            );
        }
    }
    tx.commit()?;
    Ok(conn)
}

const TRIP_COLUMNS: &str = "id, start_time, end_time, duration, distance, max_speed, \
    elevation_gain_barometer, elevation_gain_location, calories_burned, rotation_angle, \
    route_width, route_height, map_center_latitude, map_center_longitude, map_altitude";

fn datetime_of_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn trip_of_row(row: &Row) -> rusqlite::Result<Trip> {
    let rotation_angle: Option<f64> = row.get(9)?;
    let route_width: Option<f64> = row.get(10)?;
    let route_height: Option<f64> = row.get(11)?;
    let map_center_latitude: Option<f64> = row.get(12)?;
    let map_center_longitude: Option<f64> = row.get(13)?;
    // a framing is only usable if every part of it is there
    let framing = match (
        rotation_angle,
        route_width,
        route_height,
        map_center_latitude,
        map_center_longitude,
    ) {
        (Some(rotation_angle), Some(width), Some(height), Some(lat), Some(lng)) => Some(Framing {
            rotation_angle,
            width,
            height,
            center: GeoPoint::new(lat, lng),
        }),
        _ => None,
    };
    Ok(Trip {
        id: row.get(0)?,
        start_time: datetime_of_millis(row.get(1)?),
        end_time: datetime_of_millis(row.get(2)?),
        duration_sec: row.get(3)?,
        distance_km: row.get(4)?,
        max_speed: row.get(5)?,
        elevation_gain_barometer: row.get(6)?,
        elevation_gain_location: row.get(7)?,
        calories_burned: row.get(8)?,
        framing,
        map_altitude: row.get(14)?,
    })
}

pub struct Txn<'a> {
    db_txn: Transaction<'a>,
}

impl Txn<'_> {
    pub fn insert_trip(&mut self, trip: &Trip) -> Result<()> {
        info!("Inserting trip: id={}", trip.id);
        let sql = format!(
            "INSERT INTO trips ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            TRIP_COLUMNS
        );
        let framing = trip.framing.as_ref();
        self.db_txn.execute(
            &sql,
            rusqlite::params![
                &trip.id,
                trip.start_time.timestamp_millis(),
                trip.end_time.timestamp_millis(),
                trip.duration_sec,
                trip.distance_km,
                trip.max_speed,
                trip.elevation_gain_barometer,
                trip.elevation_gain_location,
                trip.calories_burned,
                framing.map(|x| x.rotation_angle),
                framing.map(|x| x.width),
                framing.map(|x| x.height),
                framing.map(|x| x.center.latitude),
                framing.map(|x| x.center.longitude),
                trip.map_altitude,
            ],
        )?;
        Ok(())
    }

    pub fn update_trip_stats(
        &mut self,
        id: &str,
        stats: &TripStats,
        calories_burned: Option<f64>,
    ) -> Result<()> {
        info!("Updating trip stats: id={}", id);
        let changes = self.db_txn.execute(
            "UPDATE trips SET end_time = ?1, duration = ?2, distance = ?3, max_speed = ?4, \
             elevation_gain_barometer = ?5, elevation_gain_location = ?6, calories_burned = ?7 \
             WHERE id = ?8;",
            rusqlite::params![
                stats.end_time.timestamp_millis(),
                stats.duration_sec,
                stats.distance_km,
                stats.max_speed,
                stats.elevation_gain_barometer,
                stats.elevation_gain_location,
                calories_burned,
                id,
            ],
        )?;
        if changes != 1 {
            bail!("Updating non existent trip, trip id = {}", id);
        }
        Ok(())
    }

    pub fn delete_trip(&mut self, id: &str) -> Result<()> {
        info!("Deleting trip: id={}", id);
        self.db_txn
            .execute("DELETE FROM tracking_points WHERE trip_id = ?1;", (id,))?;
        self.db_txn
            .execute("DELETE FROM flagged_timestamps WHERE trip_id = ?1;", (id,))?;
        let changes = self
            .db_txn
            .execute("DELETE FROM trips WHERE id = ?1;", (id,))?;
        if changes == 1 {
            Ok(())
        } else {
            Err(anyhow!("Failed to find trip with id = {}", id))
        }
    }

    pub fn delete_all_trips(&mut self) -> Result<()> {
        info!("Deleting all trips");
        self.db_txn.execute("DELETE FROM tracking_points;", ())?;
        self.db_txn.execute("DELETE FROM flagged_timestamps;", ())?;
        self.db_txn.execute("DELETE FROM trips;", ())?;
        Ok(())
    }

    pub fn get_trip(&self, id: &str) -> Result<Option<Trip>> {
        let sql = format!("SELECT {} FROM trips WHERE id = ?1;", TRIP_COLUMNS);
        let mut query = self.db_txn.prepare(&sql)?;
        Ok(query.query_row((id,), trip_of_row).optional()?)
    }

    // newest first
    pub fn query_trips(
        &self,
        from_inclusive: Option<DateTime<Utc>>,
        to_inclusive: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trip>> {
        let sql = format!(
            "SELECT {} FROM trips WHERE start_time >= (?1) AND start_time <= (?2) ORDER BY start_time DESC, id;",
            // use `id` to break tie
            TRIP_COLUMNS
        );
        let mut query = self.db_txn.prepare(&sql)?;
        let from = from_inclusive.map_or(i64::MIN, |x| x.timestamp_millis());
        let to = to_inclusive.map_or(i64::MAX, |x| x.timestamp_millis());
        let mut results = Vec::new();
        for trip in query.query_map((from, to), trip_of_row)? {
            results.push(trip?);
        }
        Ok(results)
    }

    pub fn list_all_trips(&self) -> Result<Vec<Trip>> {
        self.query_trips(None, None)
    }

    pub fn append_track_point(&mut self, trip_id: &str, point: &TrackPoint) -> Result<()> {
        let sql = "INSERT INTO tracking_points (trip_id, timestamp, latitude, longitude, speed, max_speed, avg_speed, altitude_barometer, altitude_location, barometric_pressure, heading) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);";
        self.db_txn.prepare_cached(sql)?.execute(rusqlite::params![
            trip_id,
            point.timestamp_ms,
            point.latitude,
            point.longitude,
            point.speed,
            point.max_speed,
            point.avg_speed,
            point.altitude_barometer,
            point.altitude_location,
            point.barometric_pressure,
            point.heading,
        ])?;
        Ok(())
    }

    pub fn get_track_points(&self, trip_id: &str) -> Result<Vec<TrackPoint>> {
        // `id` in `tracking_points` is auto incremented.
        let mut query = self.db_txn.prepare(
            "SELECT timestamp, latitude, longitude, speed, max_speed, avg_speed, altitude_barometer, altitude_location, barometric_pressure, heading FROM tracking_points WHERE trip_id = ?1 ORDER BY id;",
        )?;
        let results = query.query_map((trip_id,), |row| {
            Ok(TrackPoint {
                timestamp_ms: row.get(0)?,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                speed: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                max_speed: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                avg_speed: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                altitude_barometer: row.get(6)?,
                altitude_location: row.get(7)?,
                barometric_pressure: row.get(8)?,
                heading: row.get(9)?,
            })
        })?;
        let mut points = Vec::new();
        for point in results {
            points.push(point?);
        }
        Ok(points)
    }

    pub fn insert_flagged_timestamp(&mut self, trip_id: &str, flag: &FlaggedTimestamp) -> Result<()> {
        self.db_txn.execute(
            "INSERT INTO flagged_timestamps (trip_id, timestamp, latitude, longitude) VALUES (?1, ?2, ?3, ?4);",
            (trip_id, flag.timestamp_ms, flag.latitude, flag.longitude),
        )?;
        Ok(())
    }

    pub fn delete_flagged_timestamp(&mut self, trip_id: &str, timestamp_ms: i64) -> Result<()> {
        self.db_txn.execute(
            "DELETE FROM flagged_timestamps WHERE trip_id = ?1 AND timestamp = ?2;",
            (trip_id, timestamp_ms),
        )?;
        Ok(())
    }

    pub fn get_flagged_timestamps(&self, trip_id: &str) -> Result<Vec<FlaggedTimestamp>> {
        let mut query = self.db_txn.prepare(
            "SELECT timestamp, latitude, longitude FROM flagged_timestamps WHERE trip_id = ?1 ORDER BY timestamp ASC, id;",
        )?;
        let mut flags = Vec::new();
        for flag in query.query_map((trip_id,), |row| {
            Ok(FlaggedTimestamp {
                timestamp_ms: row.get(0)?,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
            })
        })? {
            flags.push(flag?);
        }
        Ok(flags)
    }

    pub fn get_cached_framing(&self, trip_id: &str) -> Result<Option<Framing>> {
        Ok(self.get_trip(trip_id)?.and_then(|trip| trip.framing))
    }

    pub fn set_framing(&mut self, trip_id: &str, framing: &Framing, altitude: f64) -> Result<()> {
        let changes = self.db_txn.execute(
            "UPDATE trips SET rotation_angle = ?1, route_width = ?2, route_height = ?3, map_center_latitude = ?4, map_center_longitude = ?5, map_altitude = ?6 WHERE id = ?7;",
            rusqlite::params![
                framing.rotation_angle,
                framing.width,
                framing.height,
                framing.center.latitude,
                framing.center.longitude,
                altitude,
                trip_id,
            ],
        )?;
        if changes != 1 {
            bail!("Setting framing of non existent trip, trip id = {}", trip_id);
        }
        debug!(
            "Framing updated: trip_id={}, framing={:?}, altitude={}",
            trip_id, framing, altitude
        );
        Ok(())
    }

    // Needed whenever the track of a trip changes, a stored framing is served
    // as is until it is cleared.
    pub fn clear_framing(&mut self, trip_id: &str) -> Result<()> {
        let changes = self.db_txn.execute(
            "UPDATE trips SET rotation_angle = NULL, route_width = NULL, route_height = NULL, map_center_latitude = NULL, map_center_longitude = NULL, map_altitude = NULL WHERE id = ?1 AND rotation_angle IS NOT NULL;",
            rusqlite::params![trip_id],
        )?;
        if changes > 0 {
            debug!("Framing cleared: trip_id={}", trip_id);
        }
        Ok(())
    }

    pub fn clear_all_framings(&mut self) -> Result<()> {
        self.db_txn.execute(
            "UPDATE trips SET rotation_angle = NULL, route_width = NULL, route_height = NULL, map_center_latitude = NULL, map_center_longitude = NULL, map_altitude = NULL;",
            (),
        )?;
        info!("Cleared framing for all trips");
        Ok(())
    }
}

pub struct MainDb {
    conn: Connection,
}

impl MainDb {
    pub fn open(support_dir: &str) -> Result<MainDb> {
        let conn = open_db_and_run_migration(
            support_dir,
            "main.db",
            &[
                &|tx| {
                    run_sql(
                        tx,
                        "
                CREATE TABLE trips (
                    id                       TEXT    PRIMARY KEY
                                                     NOT NULL
                                                     UNIQUE,
                    start_time               INTEGER NOT NULL, -- ms since epoch
                    end_time                 INTEGER NOT NULL, -- ms since epoch
                    duration                 INTEGER NOT NULL, -- seconds
                    distance                 REAL    NOT NULL, -- km
                    max_speed                REAL    NOT NULL, -- km/h
                    elevation_gain_barometer REAL,
                    elevation_gain_location  REAL,
                    calories_burned          REAL
                );
                CREATE TABLE tracking_points (
                    id                  INTEGER PRIMARY KEY AUTOINCREMENT
                                                UNIQUE
                                                NOT NULL,
                    trip_id             TEXT    NOT NULL,
                    timestamp           INTEGER NOT NULL,
                    latitude            REAL    NOT NULL,
                    longitude           REAL    NOT NULL,
                    speed               REAL,
                    max_speed           REAL,
                    avg_speed           REAL,
                    altitude_barometer  REAL,
                    altitude_location   REAL,
                    barometric_pressure REAL,
                    heading             REAL,
                    FOREIGN KEY (trip_id) REFERENCES trips (id)
                );
                CREATE INDEX tracking_points_trip_index ON tracking_points (
                    trip_id
                );
                CREATE TABLE flagged_timestamps (
                    id        INTEGER PRIMARY KEY AUTOINCREMENT
                                      UNIQUE
                                      NOT NULL,
                    trip_id   TEXT    NOT NULL,
                    timestamp INTEGER NOT NULL,
                    latitude  REAL    NOT NULL,
                    longitude REAL    NOT NULL,
                    FOREIGN KEY (trip_id) REFERENCES trips (id)
                );
                ",
                    )
                },
                &|tx| run_sql(tx, "ALTER TABLE trips ADD COLUMN rotation_angle REAL DEFAULT NULL;"),
                &|tx| {
                    run_sql(
                        tx,
                        "
                ALTER TABLE trips ADD COLUMN map_center_latitude REAL DEFAULT NULL;
                ALTER TABLE trips ADD COLUMN map_center_longitude REAL DEFAULT NULL;
                ",
                    )
                },
                &|tx| {
                    run_sql(
                        tx,
                        "
                ALTER TABLE trips ADD COLUMN route_width REAL DEFAULT NULL;
                ALTER TABLE trips ADD COLUMN route_height REAL DEFAULT NULL;
                ",
                    )
                },
                &|tx| run_sql(tx, "ALTER TABLE trips ADD COLUMN map_altitude REAL DEFAULT NULL;"),
                &|tx| {
                    run_sql(
                        tx,
                        "
                CREATE TABLE setting (
                    key               TEXT    PRIMARY KEY
                                              NOT NULL
                                              UNIQUE,
                    value             TEXT
                );
                ",
                    )
                },
            ],
        )?;
        Ok(MainDb { conn })
    }

    pub fn with_txn<F, O>(&mut self, f: F) -> Result<O>
    where
        F: FnOnce(&mut Txn) -> Result<O>,
    {
        let mut txn = Txn {
            db_txn: self.conn.transaction()?,
        };
        let output = f(&mut txn)?;
        txn.db_txn.commit()?;
        Ok(output)
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.cache_flush()?;
        Ok(())
    }

    fn get_setting<T: FromStr>(&mut self, setting: Setting) -> Result<Option<T>>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        let mut query = self
            .conn
            .prepare("SELECT value FROM setting WHERE key = ?1;")?;
        let result: Option<String> = query
            .query_row([setting.to_db_key()], |row| row.get(0))
            .optional()?;
        match result {
            None => Ok(None),
            Some(s) => {
                let v = FromStr::from_str(&s)?;
                Ok(Some(v))
            }
        }
    }

    pub fn get_setting_with_default<T: FromStr>(&mut self, setting: Setting, default: T) -> T
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        match self.get_setting(setting) {
            Ok(v) => v,
            Err(error) => {
                warn!(
                    "[main_db.get_setting_with_default] setting:{:?}, error:{}",
                    setting, error
                );
                None
            }
        }
        .unwrap_or(default)
    }

    pub fn get_optional_setting<T: FromStr>(&mut self, setting: Setting) -> Option<T>
    where
        <T as FromStr>::Err: Error + Send + Sync + 'static,
    {
        self.get_setting(setting).unwrap_or_else(|error| {
            warn!(
                "[main_db.get_optional_setting] setting:{:?}, error:{}",
                setting, error
            );
            None
        })
    }

    pub fn set_setting<T: ToString>(&mut self, setting: Setting, value: T) -> Result<()> {
        let sql = "INSERT OR REPLACE INTO setting (key, value) VALUES (?1, ?2);";
        self.conn
            .execute(sql, (setting.to_db_key(), value.to_string()))?;
        Ok(())
    }

    pub fn clear_setting(&mut self, setting: Setting) -> Result<()> {
        self.conn
            .execute("DELETE FROM setting WHERE key = ?1;", (setting.to_db_key(),))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Setting {
    Unit,
    LoggingEnabled,
    RiderWeightKg,
    RiderAgeYears,
    RiderHeightCm,
    RiderSex,
    BikeType,
}

impl Setting {
    fn to_db_key(self) -> &'static str {
        match self {
            Self::Unit => "UNIT",
            Self::LoggingEnabled => "LOGGING_ENABLED",
            Self::RiderWeightKg => "RIDER_WEIGHT_KG",
            Self::RiderAgeYears => "RIDER_AGE_YEARS",
            Self::RiderHeightCm => "RIDER_HEIGHT_CM",
            Self::RiderSex => "RIDER_SEX",
            Self::BikeType => "BIKE_TYPE",
        }
    }
}
