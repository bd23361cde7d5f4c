// --- File: crates/yoyaku_common/src/services.rs ---
//! Service abstraction over the external booking system of record.
//!
//! The trait and the types here are the only shapes the core logic ever
//! touches. The adapter crate normalizes the upstream's loosely-typed
//! payloads into these structs at its boundary; nothing downstream deals
//! with wrapper objects or optional list fields.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingSystemError;

pub type StudioId = i64;
pub type RoomId = i64;
pub type ProgramId = i64;
pub type CandidateId = i64;
pub type GuestId = i64;
pub type ReservationId = i64;
pub type SessionId = i64;
pub type EntitlementId = i64;
/// Reference to a granted entitlement unit (the upstream's member-ticket id).
pub type EntitlementRef = i64;

/// Whether a candidate is a staff member or a physical resource.
///
/// Buffers apply to staff only; resources are blocked for exactly the
/// requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Staff,
    Resource,
}

/// A staff member or physical resource eligible for assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub kind: CandidateKind,
    pub name: String,
    /// Studios this candidate serves. Empty = usable at any studio.
    pub studio_ids: Vec<StudioId>,
    /// Simultaneous capacity. Always 1 for staff.
    pub capacity: u32,
}

/// The period during which a candidate is schedulable on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub candidate_id: CandidateId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Why a candidate is unavailable during an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// An existing free-slot reservation. Widened by the request's buffers
    /// at resolve time, for staff only.
    Reservation,
    /// An explicit break / off-duty block. Hard block, never widened.
    Break,
    /// A fixed-slot session converted into a staff block, pre-widened by
    /// the session's own buffer when the snapshot is built.
    DerivedBuffer,
}

/// A time range during which a candidate is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedInterval {
    pub candidate_id: CandidateId,
    pub kind: BlockKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Lifecycle status of a reservation, owned by the system of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Tentative,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    /// Whether this reservation occupies its seat/candidate.
    pub fn occupies(self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed | ReservationStatus::Completed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub guest_id: GuestId,
    /// Room the reservation occupies, when the upstream reports it.
    pub room_id: Option<RoomId>,
    /// Set for fixed-slot reservations.
    pub session_id: Option<SessionId>,
    /// Numbered seat, fixed-slot only.
    pub seat_no: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// The cached composite of shifts, blocks and reservations for one room on
/// one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub room_id: RoomId,
    pub studio_id: StudioId,
    pub date: NaiveDate,
    pub shifts: Vec<ShiftWindow>,
    pub blocks: Vec<BlockedInterval>,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Studio {
    pub id: StudioId,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub studio_id: StudioId,
    pub name: String,
    pub duration_minutes: i64,
    /// Explicit entitlement restriction list. Takes precedence over
    /// `default_entitlement_id` when non-empty.
    pub entitlement_ids: Vec<EntitlementId>,
    pub default_entitlement_id: Option<EntitlementId>,
    /// Physical resources this program requires. Empty = staff only.
    pub resource_ids: Vec<CandidateId>,
}

impl Program {
    /// A program is bookable as a free slot only when fully configured.
    pub fn is_fully_configured(&self) -> bool {
        self.duration_minutes > 0
            && (!self.entitlement_ids.is_empty() || self.default_entitlement_id.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub studio_id: StudioId,
    pub name: String,
    pub free_slot_enabled: bool,
}

/// A numbered seat within a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub no: String,
}

/// A pre-scheduled fixed-slot session with a fixed roster of seats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub room_id: RoomId,
    pub studio_id: StudioId,
    pub program_id: ProgramId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capacity: u32,
}

/// Contact fields for creating a guest account upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGuest {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub studio_id: StudioId,
    /// Random credential generated at creation time.
    pub password: String,
}

/// Filter for reservation listing. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ReservationFilter {
    pub session_id: Option<SessionId>,
    pub room_id: Option<RoomId>,
    pub guest_id: Option<GuestId>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Payload for the final commit step.
#[derive(Debug, Clone)]
pub enum ReservationPayload {
    /// Reserve a numbered seat in a fixed-slot session.
    Fixed {
        guest_id: GuestId,
        session_id: SessionId,
        seat_no: String,
        entitlement_ref: Option<EntitlementRef>,
    },
    /// Reserve a free-slot appointment against resolved candidates.
    Free {
        guest_id: GuestId,
        room_id: RoomId,
        program_id: ProgramId,
        start: DateTime<Utc>,
        instructor_ids: Vec<CandidateId>,
        resource_ids: Vec<CandidateId>,
        entitlement_ref: Option<EntitlementRef>,
    },
}

/// The contract against the external system of record.
///
/// One adapter instance is constructed at process start and injected into
/// the orchestrator, resolver inputs and caches; there is no ambient
/// global client.
#[async_trait]
pub trait BookingSystem: Send + Sync {
    async fn list_studios(&self) -> Result<Vec<Studio>, BookingSystemError>;

    async fn list_programs(&self, studio_id: StudioId)
        -> Result<Vec<Program>, BookingSystemError>;

    async fn list_rooms(&self, studio_id: StudioId) -> Result<Vec<Room>, BookingSystemError>;

    /// Numbered-seat layout for a room. Empty when the room has no seat
    /// numbering configured.
    async fn list_room_seats(&self, room_id: RoomId) -> Result<Vec<Seat>, BookingSystemError>;

    /// All staff members with their studio associations.
    async fn list_staff(&self) -> Result<Vec<Candidate>, BookingSystemError>;

    /// Physical resources available at a studio.
    async fn list_resources(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Candidate>, BookingSystemError>;

    async fn fetch_session(&self, session_id: SessionId) -> Result<Session, BookingSystemError>;

    /// The merged schedule (shifts, blocks, reservations) for one room on
    /// one date.
    async fn fetch_schedule(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<ScheduleSnapshot, BookingSystemError>;

    /// Per-day schedules over an inclusive date range, optionally narrowed
    /// to one program's reservations.
    async fn fetch_range_schedule(
        &self,
        room_id: RoomId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        program_id: Option<ProgramId>,
    ) -> Result<Vec<ScheduleSnapshot>, BookingSystemError>;

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, BookingSystemError>;

    /// Best-effort dedup: look up an existing guest account by normalized
    /// email before ever creating one.
    async fn find_guest_by_email(
        &self,
        email: &str,
    ) -> Result<Option<GuestId>, BookingSystemError>;

    async fn create_guest(&self, guest: &NewGuest) -> Result<GuestId, BookingSystemError>;

    async fn grant_entitlement(
        &self,
        guest_id: GuestId,
        entitlement_id: EntitlementId,
        qty: u32,
    ) -> Result<EntitlementRef, BookingSystemError>;

    async fn create_reservation(
        &self,
        payload: &ReservationPayload,
    ) -> Result<Reservation, BookingSystemError>;

    async fn cancel_reservation(
        &self,
        guest_id: GuestId,
        reservation_ids: &[ReservationId],
    ) -> Result<(), BookingSystemError>;
}
