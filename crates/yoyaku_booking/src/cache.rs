// --- File: crates/yoyaku_booking/src/cache.rs ---
//! Master & snapshot caches.
//!
//! Process-wide, shared across request workers, so every cache sits on a
//! sharded concurrent map. Entries are TTL-bound; a failed refresh serves
//! the last good value when one exists (stale-serve) and propagates the
//! failure otherwise.

use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::warn;

use yoyaku_common::error::BookingSystemError;
use yoyaku_common::services::{
    Candidate, Program, ProgramId, Room, RoomId, ScheduleSnapshot, Seat, Studio, StudioId,
};
use yoyaku_config::CacheConfig;

/// A cached value plus the instant it was fetched.
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// TTL-bound concurrent cache for one scope of master data.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns the cached value if present and unexpired.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if entry.fetched_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Returns a fresh value, fetching through `fetch` on miss or expiry.
    ///
    /// On fetch failure the last cached value is served (with a warning)
    /// when one exists, expired or not; otherwise the error propagates.
    /// Two workers missing the same key concurrently may both fetch; the
    /// later insert wins, which is harmless for idempotent reads.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, fetch: F) -> Result<V, BookingSystemError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, BookingSystemError>>,
    {
        if let Some(value) = self.peek(&key) {
            return Ok(value);
        }
        match fetch().await {
            Ok(value) => {
                self.insert(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                // stale value beats no value
                if let Some(entry) = self.entries.get(&key) {
                    warn!(?key, error = %err, "Cache refresh failed, serving stale value");
                    return Ok(entry.value.clone());
                }
                Err(err)
            }
        }
    }

    /// Stores a value, replacing value and fetch timestamp together.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn retain<F: FnMut(&K) -> bool>(&self, mut keep: F) {
        self.entries.retain(|key, _| keep(key));
    }
}

/// Cache key for a per-(room, date-range, program) range snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub room_id: RoomId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub program_id: Option<ProgramId>,
}

impl RangeKey {
    fn covers(&self, room_id: RoomId, date: NaiveDate) -> bool {
        self.room_id == room_id && self.date_from <= date && date <= self.date_to
    }
}

/// All master-data and snapshot caches, one instance per process.
pub struct MasterCache {
    pub studios: TtlCache<(), Vec<Studio>>,
    pub programs: TtlCache<StudioId, Vec<Program>>,
    pub rooms: TtlCache<StudioId, Vec<Room>>,
    pub staff: TtlCache<(), Vec<Candidate>>,
    pub resources: TtlCache<StudioId, Vec<Candidate>>,
    /// Numbered-seat layouts. TTL-bound like everything else; the seat
    /// layout of a room does change when studios are refitted.
    pub seats: TtlCache<RoomId, Vec<Seat>>,
    pub schedules: TtlCache<(RoomId, NaiveDate), ScheduleSnapshot>,
    pub ranges: TtlCache<RangeKey, Vec<ScheduleSnapshot>>,
}

impl MasterCache {
    pub fn new(config: &CacheConfig) -> Self {
        MasterCache {
            studios: TtlCache::new(Duration::from_secs(config.studios_ttl_secs)),
            programs: TtlCache::new(Duration::from_secs(config.catalog_ttl_secs)),
            rooms: TtlCache::new(Duration::from_secs(config.catalog_ttl_secs)),
            staff: TtlCache::new(Duration::from_secs(config.staff_map_ttl_secs)),
            resources: TtlCache::new(Duration::from_secs(config.catalog_ttl_secs)),
            seats: TtlCache::new(Duration::from_secs(config.seat_spaces_ttl_secs)),
            schedules: TtlCache::new(Duration::from_secs(config.schedule_ttl_secs)),
            ranges: TtlCache::new(Duration::from_secs(config.range_ttl_secs)),
        }
    }

    /// Drops the snapshots a new or cancelled booking invalidates: the
    /// exact (room, date) schedule and every range snapshot whose span
    /// includes that date.
    pub fn invalidate_for_booking(&self, room_id: RoomId, date: NaiveDate) {
        self.schedules.invalidate(&(room_id, date));
        self.ranges.retain(|key| !key.covers(room_id, date));
    }
}
