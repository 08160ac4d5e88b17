/* The trip list asks for a framing every time a trip preview scrolls into
view, so results are cached at two levels:
1. in memory, keyed by `(trip_id, viewport)`. The viewport is part of the key
   because the altitude depends on it (e.g. after an orientation change).
2. in the main db, as part of the trip record. Only the viewport independent
   part is stored and the altitude is recomputed on read.

read path
1. look up the in memory cache
2. read track points + stored framing from the store
3. `framing::compute_framing`, which skips the search if the stored framing is
   complete
4. if a new framing was computed, write it back to the store. This is best
   effort: a failed write is logged and the result is still returned.

A stored framing is served as is. Whoever changes the track of a trip must
clear it (see `Txn::clear_framing`) and call `invalidate_trip`.

Computing happens without holding the lock, so a clear can land in between.
Every clear or invalidate bumps `generation`, and a result computed under an
older generation is returned but neither stored nor cached.

The in memory cache holds at most `MAX_CACHED_FRAMINGS` entries and is simply
emptied when it is full. A miss only costs one db read when the stored framing
is there.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::framing::{self, Framing, FramingError, FramingResult, FramingSource, Viewport};
use crate::track::{GeoPoint, TrackPoint};

pub trait FramingStore {
    fn read_track_points(&self, trip_id: &str) -> Result<Vec<TrackPoint>>;

    fn read_cached_framing(&self, trip_id: &str) -> Result<Option<Framing>>;

    fn write_framing(&self, trip_id: &str, framing: &FramingResult) -> Result<()>;

    fn clear_all_framings(&self) -> Result<()>;
}

impl<T: FramingStore + ?Sized> FramingStore for Arc<T> {
    fn read_track_points(&self, trip_id: &str) -> Result<Vec<TrackPoint>> {
        (**self).read_track_points(trip_id)
    }

    fn read_cached_framing(&self, trip_id: &str) -> Result<Option<Framing>> {
        (**self).read_cached_framing(trip_id)
    }

    fn write_framing(&self, trip_id: &str, framing: &FramingResult) -> Result<()> {
        (**self).write_framing(trip_id, framing)
    }

    fn clear_all_framings(&self) -> Result<()> {
        (**self).clear_all_framings()
    }
}

pub const MAX_CACHED_FRAMINGS: usize = 512;

#[derive(Default)]
struct Cache {
    generation: u64,
    entries: HashMap<(String, Viewport), FramingResult>,
}

pub struct FramingManager<S> {
    store: S,
    cache: Mutex<Cache>,
}

impl<S: FramingStore> FramingManager<S> {
    pub fn new(store: S) -> Self {
        FramingManager {
            store,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_framing(
        &self,
        trip_id: &str,
        distance_km: f64,
        viewport: Viewport,
    ) -> Result<FramingResult> {
        let key = (trip_id.to_string(), viewport);
        let generation = {
            let cache = self.cache.lock().unwrap();
            if let Some(result) = cache.entries.get(&key) {
                return Ok(*result);
            }
            cache.generation
        };

        // NOTE: we don't hold the lock while computing. Two callers could
        // compute the same trip at the same time, both results are equally
        // valid and the last write wins.
        let track: Vec<GeoPoint> = self
            .store
            .read_track_points(trip_id)?
            .iter()
            .map(TrackPoint::point)
            .collect();
        let cached = match self.store.read_cached_framing(trip_id) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    "[framing_manager] failed to read stored framing, trip_id={}, error={}",
                    trip_id, e
                );
                None
            }
        };

        let result = match framing::compute_framing(&track, distance_km, &viewport, cached.as_ref())
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "[framing_manager] using fallback framing, trip_id={}, error={}",
                    trip_id, e
                );
                FramingResult::fallback_for(&track)
            }
        };

        if self.cache.lock().unwrap().generation != generation {
            info!(
                "[framing_manager] framings cleared while computing, not keeping the result, trip_id={}",
                trip_id
            );
            return Ok(result);
        }

        if result.source == FramingSource::Computed {
            if let Err(e) = self.persist(trip_id, &result) {
                error!("[framing_manager] {}", e);
            }
        }

        let mut cache = self.cache.lock().unwrap();
        if cache.generation == generation {
            if cache.entries.len() >= MAX_CACHED_FRAMINGS {
                debug!("[framing_manager] in memory cache is full, emptying it");
                cache.entries.clear();
            }
            cache.entries.insert(key, result);
        }
        Ok(result)
    }

    fn persist(&self, trip_id: &str, result: &FramingResult) -> Result<(), FramingError> {
        self.store
            .write_framing(trip_id, result)
            .map_err(|e| FramingError::PersistenceWriteFailure {
                trip_id: trip_id.to_string(),
                reason: e.to_string(),
            })
    }

    // Drops the in memory results of a trip, the stored framing is kept.
    pub fn invalidate_trip(&self, trip_id: &str) {
        let mut cache = self.cache.lock().unwrap();
        cache.generation += 1;
        cache.entries.retain(|(id, _), _| id != trip_id);
    }

    pub fn clear_all_framings(&self) -> Result<()> {
        {
            let mut cache = self.cache.lock().unwrap();
            cache.generation += 1;
            cache.entries.clear();
        }
        self.store.clear_all_framings()?;
        info!("[framing_manager] all framings cleared");
        Ok(())
    }
}
