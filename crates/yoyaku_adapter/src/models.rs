// --- File: crates/yoyaku_adapter/src/models.rs ---
//! Wire shapes of the upstream admin API and their normalization.
//!
//! The upstream is loosely typed: list sections are sometimes a bare JSON
//! array and sometimes a wrapper object with a `list` field, timestamps are
//! local-time strings, and statuses arrive as either numbers or strings.
//! Every one of those shapes is normalized here, at the adapter boundary,
//! into the strict structs from `yoyaku_common::services`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;

use yoyaku_common::error::BookingSystemError;
use yoyaku_common::services::{
    BlockKind, BlockedInterval, Candidate, CandidateId, CandidateKind, Program, ProgramId,
    Reservation, ReservationStatus, Room, ScheduleSnapshot, Seat, Session, ShiftWindow, Studio,
};

/// Generic `{"data": ...}` envelope every upstream response uses.
#[derive(Debug, Deserialize)]
pub struct Data<T> {
    pub data: T,
}

/// A list section: either `{"list": [...], "total_count": ...}` or a bare
/// array, depending on the endpoint and sometimes on the tenant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Wrapped(ListPage<T>),
    Bare(Vec<T>),
}

#[derive(Debug, Deserialize)]
pub struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub total_page: Option<u32>,
}

impl<T> ListEnvelope<T> {
    pub fn into_list(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped(page) => page.list,
            ListEnvelope::Bare(list) => list,
        }
    }
}

impl<T> Default for ListEnvelope<T> {
    fn default() -> Self {
        ListEnvelope::Bare(Vec::new())
    }
}

/// Error payload shapes the upstream emits on 4xx responses.
pub struct UpstreamErrorBody;

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: Option<ErrorDetail>,
    code: Option<String>,
    message: Option<String>,
}

impl UpstreamErrorBody {
    /// Extracts (code, message) from a rejection body, tolerating both the
    /// nested and the flat layout. Unparseable bodies map to an empty code
    /// with the raw text as message.
    pub fn parse(text: &str) -> (String, String) {
        if let Ok(wrapper) = serde_json::from_str::<ErrorWrapper>(text) {
            let (code, message) = match wrapper.error {
                Some(detail) => (detail.code, detail.message),
                None => (wrapper.code, wrapper.message),
            };
            return (
                code.unwrap_or_default(),
                message.unwrap_or_else(|| text.to_string()),
            );
        }
        (String::new(), text.to_string())
    }
}

// --- Timestamps ---

const UPSTREAM_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parses an upstream timestamp. Local `yyyy-MM-dd HH:mm:ss(.fff)` strings
/// are interpreted in the business timezone; RFC3339 passes through.
pub fn parse_upstream_datetime(s: &str, tz: &Tz) -> Result<DateTime<Utc>, BookingSystemError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, UPSTREAM_DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|e| BookingSystemError::Parse(format!("bad timestamp {s:?}: {e}")))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| BookingSystemError::Parse(format!("nonexistent local time {s:?}")))
}

/// Formats a timestamp the way the upstream expects in request payloads.
pub fn format_upstream_datetime(dt: DateTime<Utc>, tz: &Tz) -> String {
    dt.with_timezone(tz).format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

// --- Raw entities ---

#[derive(Debug, Deserialize)]
pub struct RawStudio {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl From<RawStudio> for Studio {
    fn from(raw: RawStudio) -> Self {
        Studio {
            id: raw.id,
            name: raw.name,
            code: raw.code.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawProgram {
    pub id: i64,
    #[serde(default)]
    pub studio_id: i64,
    pub name: String,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub ticket_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub default_ticket_id: Option<i64>,
    #[serde(default)]
    pub resource_ids: Option<Vec<i64>>,
}

impl From<RawProgram> for Program {
    fn from(raw: RawProgram) -> Self {
        Program {
            id: raw.id,
            studio_id: raw.studio_id,
            name: raw.name,
            duration_minutes: raw.duration.unwrap_or(0),
            entitlement_ids: raw.ticket_ids.unwrap_or_default(),
            default_entitlement_id: raw.default_ticket_id,
            resource_ids: raw.resource_ids.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawRoom {
    pub id: i64,
    pub studio_id: i64,
    pub name: String,
    #[serde(default)]
    pub is_choice_enabled: Option<bool>,
}

impl From<RawRoom> for Room {
    fn from(raw: RawRoom) -> Self {
        Room {
            id: raw.id,
            studio_id: raw.studio_id,
            name: raw.name,
            free_slot_enabled: raw.is_choice_enabled.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawSpace {
    pub no: Value,
}

impl From<RawSpace> for Seat {
    fn from(raw: RawSpace) -> Self {
        // seat numbers arrive as strings or integers
        let no = match raw.no {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Seat { no }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawInstructor {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub studio_ids: Option<Vec<i64>>,
}

impl From<RawInstructor> for Candidate {
    fn from(raw: RawInstructor) -> Self {
        Candidate {
            id: raw.id,
            kind: CandidateKind::Staff,
            name: raw.name,
            studio_ids: raw.studio_ids.unwrap_or_default(),
            capacity: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawResource {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub studio_id: Option<i64>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl From<RawResource> for Candidate {
    fn from(raw: RawResource) -> Self {
        Candidate {
            id: raw.id,
            kind: CandidateKind::Resource,
            name: raw.name,
            studio_ids: raw.studio_id.map(|id| vec![id]).unwrap_or_default(),
            capacity: raw.capacity.unwrap_or(1),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawLesson {
    pub id: i64,
    pub studio_id: i64,
    pub studio_room_id: i64,
    pub program_id: i64,
    #[serde(default)]
    pub instructor_id: Option<i64>,
    pub start_at: String,
    pub end_at: String,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub max_num: Option<u32>,
    #[serde(default)]
    pub buffer_minutes: Option<i64>,
}

impl RawLesson {
    pub fn into_session(self, tz: &Tz) -> Result<Session, BookingSystemError> {
        Ok(Session {
            id: self.id,
            room_id: self.studio_room_id,
            studio_id: self.studio_id,
            program_id: self.program_id,
            start: parse_upstream_datetime(&self.start_at, tz)?,
            end: parse_upstream_datetime(&self.end_at, tz)?,
            capacity: self.capacity.or(self.max_num).unwrap_or(1),
        })
    }
}

/// Status arrives as a number on some endpoints and a string on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Code(i64),
    Name(String),
}

impl RawStatus {
    pub fn normalize(&self) -> ReservationStatus {
        match self {
            RawStatus::Code(0) => ReservationStatus::Tentative,
            RawStatus::Code(1) => ReservationStatus::Confirmed,
            RawStatus::Code(2) => ReservationStatus::Completed,
            RawStatus::Code(3) => ReservationStatus::Cancelled,
            RawStatus::Code(4) => ReservationStatus::NoShow,
            RawStatus::Code(_) => ReservationStatus::Tentative,
            RawStatus::Name(name) => match name.as_str() {
                "confirmed" | "reserved" => ReservationStatus::Confirmed,
                "completed" | "consumed" => ReservationStatus::Completed,
                "cancelled" | "canceled" => ReservationStatus::Cancelled,
                "no_show" | "noshow" => ReservationStatus::NoShow,
                _ => ReservationStatus::Tentative,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RawResourceRef {
    pub resource_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawReservation {
    pub id: i64,
    pub member_id: i64,
    #[serde(default)]
    pub studio_room_id: Option<i64>,
    #[serde(default)]
    pub studio_lesson_id: Option<i64>,
    #[serde(default)]
    pub program_id: Option<i64>,
    #[serde(default)]
    pub no: Option<Value>,
    pub start_at: String,
    pub end_at: String,
    pub status: RawStatus,
    #[serde(default)]
    pub instructor_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub resource_id_set: Option<Vec<RawResourceRef>>,
}

impl RawReservation {
    pub fn normalize(&self, tz: &Tz) -> Result<Reservation, BookingSystemError> {
        Ok(Reservation {
            id: self.id,
            guest_id: self.member_id,
            room_id: self.studio_room_id,
            session_id: self.studio_lesson_id,
            seat_no: self.no.as_ref().map(|no| match no {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            start: parse_upstream_datetime(&self.start_at, tz)?,
            end: parse_upstream_datetime(&self.end_at, tz)?,
            status: self.status.normalize(),
        })
    }

    fn assigned_candidates(&self) -> Vec<CandidateId> {
        let mut ids: Vec<CandidateId> = self.instructor_ids.clone().unwrap_or_default();
        if let Some(resources) = &self.resource_id_set {
            ids.extend(resources.iter().map(|r| r.resource_id));
        }
        ids
    }
}

// --- Choice (free-slot) schedule ---

#[derive(Debug, Deserialize)]
pub struct RawRoomService {
    pub studio_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawShift {
    pub instructor_id: i64,
    pub start_at: String,
    pub end_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RawShiftSlot {
    pub instructor_id: i64,
    pub start_at: String,
    pub end_at: String,
}

/// The raw free-slot schedule for one room on one date.
#[derive(Debug, Deserialize)]
pub struct RawChoiceSchedule {
    #[serde(default)]
    pub studio_room_service: Option<RawRoomService>,
    /// Instructor shift windows for the day.
    #[serde(default)]
    pub shifts: Option<ListEnvelope<RawShift>>,
    /// Break / off-duty blocks.
    #[serde(default)]
    pub shift_slots: Option<ListEnvelope<RawShiftSlot>>,
    /// Existing free-slot reservations.
    #[serde(default)]
    pub reservations: Option<ListEnvelope<RawReservation>>,
    /// Fixed-slot sessions in the same room, converted into staff blocks.
    #[serde(default)]
    pub studio_lessons: Option<ListEnvelope<RawLesson>>,
}

impl RawChoiceSchedule {
    /// Merges the three availability signals into one snapshot:
    /// shifts stay as-is, breaks become hard blocks, existing reservations
    /// become `Reservation` blocks per assigned candidate, and fixed-slot
    /// sessions become `DerivedBuffer` staff blocks widened by the
    /// session's own buffer.
    pub fn into_snapshot(
        self,
        room_id: i64,
        date: NaiveDate,
        tz: &Tz,
        program_filter: Option<ProgramId>,
    ) -> Result<ScheduleSnapshot, BookingSystemError> {
        let studio_id = self
            .studio_room_service
            .as_ref()
            .map(|service| service.studio_id)
            .unwrap_or(0);

        let mut shifts = Vec::new();
        for raw in self.shifts.unwrap_or_default().into_list() {
            shifts.push(ShiftWindow {
                candidate_id: raw.instructor_id,
                start: parse_upstream_datetime(&raw.start_at, tz)?,
                end: parse_upstream_datetime(&raw.end_at, tz)?,
            });
        }

        let mut blocks = Vec::new();
        for raw in self.shift_slots.unwrap_or_default().into_list() {
            blocks.push(BlockedInterval {
                candidate_id: raw.instructor_id,
                kind: BlockKind::Break,
                start: parse_upstream_datetime(&raw.start_at, tz)?,
                end: parse_upstream_datetime(&raw.end_at, tz)?,
            });
        }

        let mut reservations = Vec::new();
        for raw in self.reservations.unwrap_or_default().into_list() {
            let normalized = raw.normalize(tz)?;
            if normalized.status.occupies() {
                for candidate_id in raw.assigned_candidates() {
                    blocks.push(BlockedInterval {
                        candidate_id,
                        kind: BlockKind::Reservation,
                        start: normalized.start,
                        end: normalized.end,
                    });
                }
            }
            if program_filter.is_none() || raw.program_id == program_filter {
                reservations.push(normalized);
            }
        }

        for raw in self.studio_lessons.unwrap_or_default().into_list() {
            let Some(instructor_id) = raw.instructor_id else {
                continue;
            };
            let buffer = chrono::Duration::minutes(raw.buffer_minutes.unwrap_or(0));
            blocks.push(BlockedInterval {
                candidate_id: instructor_id,
                kind: BlockKind::DerivedBuffer,
                start: parse_upstream_datetime(&raw.start_at, tz)? - buffer,
                end: parse_upstream_datetime(&raw.end_at, tz)? + buffer,
            });
        }

        Ok(ScheduleSnapshot {
            room_id,
            studio_id,
            date,
            shifts,
            blocks,
            reservations,
        })
    }
}
