// --- File: crates/yoyaku_booking/src/testutil.rs ---
//! In-memory fake of the upstream booking system for orchestrator and
//! refresh tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use yoyaku_common::error::BookingSystemError;
use yoyaku_common::services::{
    BookingSystem, Candidate, CandidateKind, EntitlementId, EntitlementRef, GuestId, NewGuest,
    Program, ProgramId, Reservation, ReservationFilter, ReservationId, ReservationPayload,
    ReservationStatus, Room, RoomId, ScheduleSnapshot, Seat, Session, SessionId, ShiftWindow,
    Studio, StudioId,
};

pub struct MockBookingSystem {
    pub studios: Vec<Studio>,
    pub rooms: Vec<Room>,
    pub programs: Vec<Program>,
    pub staff: Vec<Candidate>,
    pub resources: Vec<Candidate>,
    pub seats: Vec<Seat>,
    pub sessions: Vec<Session>,
    pub snapshots: Mutex<HashMap<(RoomId, NaiveDate), ScheduleSnapshot>>,
    pub reservations: Mutex<Vec<Reservation>>,
    /// normalized email -> guest id
    pub guests: Mutex<HashMap<String, GuestId>>,
    pub next_id: AtomicI64,
    pub fail_grant: AtomicBool,
    pub fail_create_guest: AtomicBool,
    /// Rooms whose range fetches fail.
    pub fail_range_rooms: Vec<RoomId>,
    /// Trait method names, in call order.
    pub calls: Mutex<Vec<&'static str>>,
}

impl Default for MockBookingSystem {
    fn default() -> Self {
        MockBookingSystem {
            studios: Vec::new(),
            rooms: Vec::new(),
            programs: Vec::new(),
            staff: Vec::new(),
            resources: Vec::new(),
            seats: Vec::new(),
            sessions: Vec::new(),
            snapshots: Mutex::new(HashMap::new()),
            reservations: Mutex::new(Vec::new()),
            guests: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            fail_grant: AtomicBool::new(false),
            fail_create_guest: AtomicBool::new(false),
            fail_range_rooms: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockBookingSystem {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| *c == call)
    }

    fn fresh_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn empty_snapshot(&self, room_id: RoomId, date: NaiveDate) -> ScheduleSnapshot {
        let studio_id = self
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .map(|r| r.studio_id)
            .unwrap_or(0);
        ScheduleSnapshot {
            room_id,
            studio_id,
            date,
            shifts: Vec::new(),
            blocks: Vec::new(),
            reservations: Vec::new(),
        }
    }
}

#[async_trait]
impl BookingSystem for MockBookingSystem {
    async fn list_studios(&self) -> Result<Vec<Studio>, BookingSystemError> {
        self.record("list_studios");
        Ok(self.studios.clone())
    }

    async fn list_programs(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Program>, BookingSystemError> {
        self.record("list_programs");
        Ok(self
            .programs
            .iter()
            .filter(|p| p.studio_id == studio_id)
            .cloned()
            .collect())
    }

    async fn list_rooms(&self, studio_id: StudioId) -> Result<Vec<Room>, BookingSystemError> {
        self.record("list_rooms");
        Ok(self
            .rooms
            .iter()
            .filter(|r| r.studio_id == studio_id)
            .cloned()
            .collect())
    }

    async fn list_room_seats(&self, _room_id: RoomId) -> Result<Vec<Seat>, BookingSystemError> {
        self.record("list_room_seats");
        Ok(self.seats.clone())
    }

    async fn list_staff(&self) -> Result<Vec<Candidate>, BookingSystemError> {
        self.record("list_staff");
        Ok(self.staff.clone())
    }

    async fn list_resources(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Candidate>, BookingSystemError> {
        self.record("list_resources");
        Ok(self
            .resources
            .iter()
            .filter(|c| c.studio_ids.is_empty() || c.studio_ids.contains(&studio_id))
            .cloned()
            .collect())
    }

    async fn fetch_session(&self, session_id: SessionId) -> Result<Session, BookingSystemError> {
        self.record("fetch_session");
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| BookingSystemError::NotFound(format!("session {session_id}")))
    }

    async fn fetch_schedule(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<ScheduleSnapshot, BookingSystemError> {
        self.record("fetch_schedule");
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots
            .get(&(room_id, date))
            .cloned()
            .unwrap_or_else(|| self.empty_snapshot(room_id, date)))
    }

    async fn fetch_range_schedule(
        &self,
        room_id: RoomId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        _program_id: Option<ProgramId>,
    ) -> Result<Vec<ScheduleSnapshot>, BookingSystemError> {
        self.record("fetch_range_schedule");
        if self.fail_range_rooms.contains(&room_id) {
            return Err(BookingSystemError::Unavailable("range fetch down".into()));
        }
        let snapshots = self.snapshots.lock().unwrap();
        let mut out = Vec::new();
        let mut date = date_from;
        while date <= date_to {
            out.push(
                snapshots
                    .get(&(room_id, date))
                    .cloned()
                    .unwrap_or_else(|| self.empty_snapshot(room_id, date)),
            );
            date += Duration::days(1);
        }
        Ok(out)
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, BookingSystemError> {
        self.record("list_reservations");
        Ok(self
            .reservations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.session_id.map_or(true, |id| r.session_id == Some(id)))
            .filter(|r| filter.guest_id.map_or(true, |id| r.guest_id == id))
            .cloned()
            .collect())
    }

    async fn find_guest_by_email(
        &self,
        email: &str,
    ) -> Result<Option<GuestId>, BookingSystemError> {
        self.record("find_guest_by_email");
        Ok(self.guests.lock().unwrap().get(email).copied())
    }

    async fn create_guest(&self, guest: &NewGuest) -> Result<GuestId, BookingSystemError> {
        self.record("create_guest");
        if self.fail_create_guest.load(Ordering::SeqCst) {
            return Err(BookingSystemError::Rejected {
                code: "E42200".into(),
                message: "invalid member".into(),
            });
        }
        let id = self.fresh_id();
        self.guests.lock().unwrap().insert(guest.email.clone(), id);
        Ok(id)
    }

    async fn grant_entitlement(
        &self,
        _guest_id: GuestId,
        _entitlement_id: EntitlementId,
        _qty: u32,
    ) -> Result<EntitlementRef, BookingSystemError> {
        self.record("grant_entitlement");
        if self.fail_grant.load(Ordering::SeqCst) {
            return Err(BookingSystemError::Rejected {
                code: "E40004".into(),
                message: "ticket unavailable".into(),
            });
        }
        Ok(self.fresh_id())
    }

    async fn create_reservation(
        &self,
        payload: &ReservationPayload,
    ) -> Result<Reservation, BookingSystemError> {
        self.record("create_reservation");
        let reservation = match payload {
            ReservationPayload::Fixed {
                guest_id,
                session_id,
                seat_no,
                ..
            } => {
                let session = self
                    .sessions
                    .iter()
                    .find(|s| s.id == *session_id)
                    .ok_or_else(|| BookingSystemError::NotFound("session".into()))?;
                Reservation {
                    id: self.fresh_id(),
                    guest_id: *guest_id,
                    room_id: Some(session.room_id),
                    session_id: Some(*session_id),
                    seat_no: Some(seat_no.clone()),
                    start: session.start,
                    end: session.end,
                    status: ReservationStatus::Confirmed,
                }
            }
            ReservationPayload::Free {
                guest_id,
                room_id,
                program_id,
                start,
                ..
            } => {
                let duration = self
                    .programs
                    .iter()
                    .find(|p| p.id == *program_id)
                    .map(|p| p.duration_minutes)
                    .unwrap_or(60);
                Reservation {
                    id: self.fresh_id(),
                    guest_id: *guest_id,
                    room_id: Some(*room_id),
                    session_id: None,
                    seat_no: None,
                    start: *start,
                    end: *start + Duration::minutes(duration),
                    status: ReservationStatus::Confirmed,
                }
            }
        };
        self.reservations.lock().unwrap().push(reservation.clone());
        Ok(reservation)
    }

    async fn cancel_reservation(
        &self,
        guest_id: GuestId,
        reservation_ids: &[ReservationId],
    ) -> Result<(), BookingSystemError> {
        self.record("cancel_reservation");
        let mut reservations = self.reservations.lock().unwrap();
        for reservation in reservations
            .iter_mut()
            .filter(|r| r.guest_id == guest_id && reservation_ids.contains(&r.id))
        {
            reservation.status = ReservationStatus::Cancelled;
        }
        Ok(())
    }
}

pub fn staff_member(id: i64, studio_ids: Vec<StudioId>) -> Candidate {
    Candidate {
        id,
        kind: CandidateKind::Staff,
        name: format!("staff-{id}"),
        studio_ids,
        capacity: 1,
    }
}

pub fn resource(id: i64, studio_ids: Vec<StudioId>) -> Candidate {
    Candidate {
        id,
        kind: CandidateKind::Resource,
        name: format!("resource-{id}"),
        studio_ids,
        capacity: 1,
    }
}

pub fn shift(candidate_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> ShiftWindow {
    ShiftWindow {
        candidate_id,
        start,
        end,
    }
}
