// --- File: crates/yoyaku_booking/src/cache_test.rs ---

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use yoyaku_common::error::BookingSystemError;

use crate::cache::{MasterCache, RangeKey, TtlCache};
use yoyaku_config::CacheConfig;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, day).unwrap()
}

#[tokio::test]
async fn fresh_value_skips_the_fetch() {
    let cache: TtlCache<i64, String> = TtlCache::new(Duration::from_secs(60));
    let fetches = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .get_or_refresh(1, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok("value".to_string())
            })
            .await
            .unwrap();
        assert_eq!(value, "value");
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    // Zero TTL: every read is an expiry.
    let cache: TtlCache<i64, String> = TtlCache::new(Duration::from_secs(0));
    let fetches = AtomicUsize::new(0);

    for _ in 0..2 {
        cache
            .get_or_refresh(1, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok("value".to_string())
            })
            .await
            .unwrap();
    }
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_refresh_serves_the_stale_value() {
    let cache: TtlCache<i64, String> = TtlCache::new(Duration::from_secs(0));
    cache.insert(1, "stale".to_string());

    let value = cache
        .get_or_refresh(1, || async {
            Err(BookingSystemError::Unavailable("upstream down".into()))
        })
        .await
        .unwrap();
    assert_eq!(value, "stale");
}

#[tokio::test]
async fn failed_fetch_without_a_cached_value_propagates() {
    let cache: TtlCache<i64, String> = TtlCache::new(Duration::from_secs(60));
    let result = cache
        .get_or_refresh(1, || async {
            Err(BookingSystemError::Unavailable("upstream down".into()))
        })
        .await;
    assert!(matches!(result, Err(BookingSystemError::Unavailable(_))));
}

#[test]
fn booking_invalidation_drops_covering_snapshots_only() {
    let cache = MasterCache::new(&CacheConfig::default());
    let room = 10;

    cache.schedules.insert(
        (room, date(5)),
        yoyaku_common::services::ScheduleSnapshot {
            room_id: room,
            studio_id: 1,
            date: date(5),
            shifts: Vec::new(),
            blocks: Vec::new(),
            reservations: Vec::new(),
        },
    );
    let covering = RangeKey {
        room_id: room,
        date_from: date(1),
        date_to: date(7),
        program_id: None,
    };
    let outside = RangeKey {
        room_id: room,
        date_from: date(8),
        date_to: date(14),
        program_id: None,
    };
    let other_room = RangeKey {
        room_id: 11,
        date_from: date(1),
        date_to: date(7),
        program_id: Some(3),
    };
    cache.ranges.insert(covering.clone(), Vec::new());
    cache.ranges.insert(outside.clone(), Vec::new());
    cache.ranges.insert(other_room.clone(), Vec::new());

    cache.invalidate_for_booking(room, date(5));

    assert!(cache.schedules.peek(&(room, date(5))).is_none());
    assert!(cache.ranges.peek(&covering).is_none());
    assert!(cache.ranges.peek(&outside).is_some());
    assert!(cache.ranges.peek(&other_room).is_some());
}
