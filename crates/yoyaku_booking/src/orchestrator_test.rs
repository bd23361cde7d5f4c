// --- File: crates/yoyaku_booking/src/orchestrator_test.rs ---

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;

use yoyaku_common::services::{
    BlockKind, BlockedInterval, Program, Reservation, ReservationStatus, Room, ScheduleSnapshot,
    Seat, Session, Studio,
};
use yoyaku_config::BookingConfig;

use crate::cache::MasterCache;
use crate::error::BookingError;
use crate::orchestrator::{FixedBookingRequest, FreeBookingRequest, GuestRequest, Orchestrator};
use crate::testutil::{resource, shift, staff_member, MockBookingSystem};
use crate::verify::{generate_token, verify_token};

const STUDIO: i64 = 1;
const ROOM: i64 = 10;
const PROGRAM: i64 = 100;
const SESSION: i64 = 500;
const SALT: &str = "test-salt";

fn booking_config() -> BookingConfig {
    BookingConfig {
        time_zone: "Asia/Tokyo".to_string(),
        min_lead_minutes: 30,
        max_horizon_days: 14,
        buffer_before_minutes: 10,
        buffer_after_minutes: 10,
        default_entitlement_id: Some(7),
        token_salt: SALT.to_string(),
    }
}

fn guest() -> GuestRequest {
    GuestRequest {
        name: "山田 太郎".to_string(),
        email: "guest@example.com".to_string(),
        phone: "090-1234-5678".to_string(),
    }
}

fn tokyo_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Tokyo).date_naive()
}

fn base_system(session_start: DateTime<Utc>) -> MockBookingSystem {
    let mut system = MockBookingSystem::default();
    system.studios = vec![Studio {
        id: STUDIO,
        name: "Main".to_string(),
        code: "main".to_string(),
    }];
    system.rooms = vec![Room {
        id: ROOM,
        studio_id: STUDIO,
        name: "Room A".to_string(),
        free_slot_enabled: true,
    }];
    system.programs = vec![Program {
        id: PROGRAM,
        studio_id: STUDIO,
        name: "Personal".to_string(),
        duration_minutes: 60,
        entitlement_ids: vec![7],
        default_entitlement_id: None,
        resource_ids: Vec::new(),
    }];
    system.seats = ["1", "2", "3"]
        .iter()
        .map(|no| Seat { no: no.to_string() })
        .collect();
    system.sessions = vec![Session {
        id: SESSION,
        room_id: ROOM,
        studio_id: STUDIO,
        program_id: PROGRAM,
        start: session_start,
        end: session_start + Duration::minutes(60),
        capacity: 3,
    }];
    system
}

fn orchestrator(system: Arc<MockBookingSystem>) -> Orchestrator {
    let cache = Arc::new(MasterCache::new(&Default::default()));
    Orchestrator::new(system, cache, booking_config()).unwrap()
}

/// Seeds the snapshot a free-slot booking will resolve against.
fn seed_snapshot(system: &MockBookingSystem, start: DateTime<Utc>, snapshot: ScheduleSnapshot) {
    system
        .snapshots
        .lock()
        .unwrap()
        .insert((ROOM, tokyo_date(start)), snapshot);
}

fn working_snapshot(start: DateTime<Utc>, candidate_ids: &[i64]) -> ScheduleSnapshot {
    ScheduleSnapshot {
        room_id: ROOM,
        studio_id: STUDIO,
        date: tokyo_date(start),
        shifts: candidate_ids
            .iter()
            .map(|&id| shift(id, start - Duration::hours(2), start + Duration::hours(3)))
            .collect(),
        blocks: Vec::new(),
        reservations: Vec::new(),
    }
}

#[tokio::test]
async fn fixed_booking_assigns_lowest_free_seat() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.reservation.seat_no.as_deref(), Some("1"));
    assert!(verify_token(
        "guest@example.com",
        "09012345678",
        SALT,
        &outcome.verify_token
    ));
    assert!(system.called("create_guest"));
    assert!(system.called("grant_entitlement"));
}

#[tokio::test]
async fn fixed_booking_reuses_existing_guest_account() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    system
        .guests
        .lock()
        .unwrap()
        .insert("guest@example.com".to_string(), 42);
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.guest_id, 42);
    assert!(!system.called("create_guest"));
}

#[tokio::test]
async fn fixed_booking_skips_seats_held_by_occupying_reservations() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    {
        let mut reservations = system.reservations.lock().unwrap();
        for (seat, status) in [
            ("1", ReservationStatus::Confirmed),
            ("2", ReservationStatus::Cancelled),
        ] {
            reservations.push(Reservation {
                id: 900 + seat.parse::<i64>().unwrap(),
                guest_id: 1,
                room_id: Some(ROOM),
                session_id: Some(SESSION),
                seat_no: Some(seat.to_string()),
                start,
                end: start + Duration::minutes(60),
                status,
            });
        }
    }
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();

    // Seat 1 is held; seat 2's reservation is cancelled and frees the seat.
    assert_eq!(outcome.reservation.seat_no.as_deref(), Some("2"));
}

#[tokio::test]
async fn fixed_booking_fails_when_session_is_full() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    {
        let mut reservations = system.reservations.lock().unwrap();
        for (i, seat) in ["1", "2", "3"].iter().enumerate() {
            reservations.push(Reservation {
                id: 900 + i as i64,
                guest_id: 1,
                room_id: Some(ROOM),
                session_id: Some(SESSION),
                seat_no: Some(seat.to_string()),
                start,
                end: start + Duration::minutes(60),
                status: ReservationStatus::Confirmed,
            });
        }
    }
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatFull));
}

#[tokio::test]
async fn fixed_booking_requires_seat_numbering() {
    let start = Utc::now() + Duration::days(1);
    let mut system = base_system(start);
    system.seats = Vec::new();
    let orchestrator = orchestrator(Arc::new(system));

    let err = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoValidSeat));
}

#[tokio::test]
async fn window_bounds_are_inclusive_on_both_ends() {
    let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
    let system = Arc::new(base_system(now));
    let orchestrator = orchestrator(system);

    // Exactly now + minimum lead and exactly now + horizon are accepted.
    assert!(orchestrator
        .validate_window(now + Duration::minutes(30), now)
        .is_ok());
    assert!(orchestrator
        .validate_window(now + Duration::days(14), now)
        .is_ok());
    // One minute inside either bound is rejected.
    assert!(orchestrator
        .validate_window(now + Duration::minutes(29), now)
        .is_err());
    assert!(orchestrator
        .validate_window(now + Duration::days(14) + Duration::minutes(1), now)
        .is_err());
}

#[tokio::test]
async fn booking_rejects_too_short_lead_time() {
    let start = Utc::now() + Duration::minutes(10);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::OutOfRange(_)));
}

#[tokio::test]
async fn booking_rejects_start_beyond_horizon() {
    let start = Utc::now() + Duration::days(20);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::OutOfRange(_)));
}

#[tokio::test]
async fn entitlement_grant_failure_does_not_block_the_booking() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    system.fail_grant.store(true, Ordering::SeqCst);
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();
    assert!(system.called("grant_entitlement"));
    assert_eq!(outcome.reservation.seat_no.as_deref(), Some("1"));
}

#[tokio::test]
async fn free_booking_assigns_an_available_instructor() {
    let start = Utc::now() + Duration::days(1);
    let mut system = base_system(start);
    system.staff = vec![staff_member(1, vec![STUDIO])];
    let system = Arc::new(system);
    seed_snapshot(&system, start, working_snapshot(start, &[1]));
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_free(&FreeBookingRequest {
            room_id: ROOM,
            program_id: PROGRAM,
            start,
            guest: guest(),
            instructor_allow: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.reservation.start, start);
    assert!(system.called("create_reservation"));
}

#[tokio::test]
async fn free_booking_fails_without_an_available_instructor() {
    let start = Utc::now() + Duration::days(1);
    let mut system = base_system(start);
    system.staff = vec![staff_member(1, vec![STUDIO])];
    let system = Arc::new(system);
    // No shift seeded for the staff member.
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .book_free(&FreeBookingRequest {
            room_id: ROOM,
            program_id: PROGRAM,
            start,
            guest: guest(),
            instructor_allow: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoAvailableInstructor));
}

#[tokio::test]
async fn free_booking_resolves_required_resources() {
    let start = Utc::now() + Duration::days(1);
    let mut system = base_system(start);
    system.staff = vec![staff_member(1, vec![STUDIO])];
    system.resources = vec![resource(30, vec![STUDIO])];
    system.programs[0].resource_ids = vec![30];
    let system = Arc::new(system);
    // Only the staff member has a shift; the resource resolves without one.
    seed_snapshot(&system, start, working_snapshot(start, &[1]));
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_free(&FreeBookingRequest {
            room_id: ROOM,
            program_id: PROGRAM,
            start,
            guest: guest(),
            instructor_allow: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.reservation.start, start);
}

#[tokio::test]
async fn free_booking_fails_when_the_required_resource_is_unavailable() {
    let start = Utc::now() + Duration::days(1);
    let mut system = base_system(start);
    system.staff = vec![staff_member(1, vec![STUDIO])];
    system.resources = vec![resource(30, vec![STUDIO])];
    system.programs[0].resource_ids = vec![30];
    let system = Arc::new(system);
    // The staff member is free; the resource is held by a reservation.
    let mut snapshot = working_snapshot(start, &[1]);
    snapshot.blocks.push(BlockedInterval {
        candidate_id: 30,
        kind: BlockKind::Reservation,
        start,
        end: start + Duration::minutes(60),
    });
    seed_snapshot(&system, start, snapshot);
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .book_free(&FreeBookingRequest {
            room_id: ROOM,
            program_id: PROGRAM,
            start,
            guest: guest(),
            instructor_allow: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NoAvailableResource));
}

#[tokio::test]
async fn cancellation_requires_a_valid_token() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(system);

    let err = orchestrator
        .cancel(1, "guest@example.com", "09012345678", "wrong-token")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AuthFailed));
}

#[tokio::test]
async fn cancellation_marks_the_reservation_cancelled() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();

    let token = generate_token("guest@example.com", "09012345678", SALT);
    orchestrator
        .cancel(outcome.reservation.id, "guest@example.com", "09012345678", &token)
        .await
        .unwrap();

    let reservations = system.reservations.lock().unwrap();
    let cancelled = reservations
        .iter()
        .find(|r| r.id == outcome.reservation.id)
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn detail_lookup_returns_only_the_guests_own_reservation() {
    let start = Utc::now() + Duration::days(1);
    let system = Arc::new(base_system(start));
    let orchestrator = orchestrator(Arc::clone(&system));

    let outcome = orchestrator
        .book_fixed(&FixedBookingRequest {
            session_id: SESSION,
            guest: guest(),
        })
        .await
        .unwrap();

    let token = generate_token("guest@example.com", "09012345678", SALT);
    let detail = orchestrator
        .reservation_detail(outcome.reservation.id, "guest@example.com", "09012345678", &token)
        .await
        .unwrap();
    assert_eq!(detail.id, outcome.reservation.id);

    let err = orchestrator
        .reservation_detail(999_999, "guest@example.com", "09012345678", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::ReservationNotFound));
}
