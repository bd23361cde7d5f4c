// --- File: crates/yoyaku_adapter/src/service.rs ---
//! `BookingSystem` implementation over the upstream admin API.

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use yoyaku_common::error::BookingSystemError;
use yoyaku_common::services::{
    BookingSystem, Candidate, EntitlementId, EntitlementRef, GuestId, NewGuest, Program, ProgramId,
    Reservation, ReservationFilter, ReservationId, ReservationPayload, Room, RoomId,
    ScheduleSnapshot, Seat, Session, SessionId, Studio, StudioId,
};
use yoyaku_config::UpstreamConfig;

use crate::client::UpstreamClient;
use crate::models::{
    format_upstream_datetime, Data, ListEnvelope, RawChoiceSchedule, RawInstructor, RawLesson,
    RawProgram, RawReservation, RawResource, RawRoom, RawSpace, RawStudio,
};

// Per-endpoint response sections. The upstream nests every payload under
// `data.<entity-name>`.
#[derive(Deserialize)]
struct StudiosSection {
    studios: ListEnvelope<RawStudio>,
}
#[derive(Deserialize)]
struct ProgramsSection {
    programs: ListEnvelope<RawProgram>,
}
#[derive(Deserialize)]
struct RoomsSection {
    studio_rooms: ListEnvelope<RawRoom>,
}
#[derive(Deserialize)]
struct SpacesSection {
    spaces: ListEnvelope<RawSpace>,
}
#[derive(Deserialize)]
struct InstructorsSection {
    instructors: ListEnvelope<RawInstructor>,
}
#[derive(Deserialize)]
struct ResourcesSection {
    resources: ListEnvelope<RawResource>,
}
#[derive(Deserialize)]
struct LessonSection {
    studio_lesson: RawLesson,
}
#[derive(Deserialize)]
struct ScheduleSection {
    schedule: RawChoiceSchedule,
}
#[derive(Deserialize)]
struct ReservationsSection {
    reservations: ListEnvelope<RawReservation>,
}
#[derive(Deserialize)]
struct ReservationSection {
    reservation: RawReservation,
}
#[derive(Deserialize)]
struct MemberRef {
    id: i64,
}
#[derive(Deserialize)]
struct MemberSection {
    member: MemberRef,
}
#[derive(Deserialize)]
struct MembersSection {
    members: ListEnvelope<MemberRef>,
}
#[derive(Deserialize)]
struct MemberTicketSection {
    member_ticket: MemberRef,
}

/// The production booking-system adapter.
pub struct UpstreamBookingService {
    client: UpstreamClient,
    tz: Tz,
}

impl UpstreamBookingService {
    pub fn new(config: &UpstreamConfig, time_zone: &str) -> Result<Self, BookingSystemError> {
        let tz: Tz = time_zone
            .parse()
            .map_err(|_| BookingSystemError::Parse(format!("invalid timezone {time_zone:?}")))?;
        Ok(UpstreamBookingService {
            client: UpstreamClient::new(config),
            tz,
        })
    }

    async fn fetch_schedule_inner(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        program_filter: Option<ProgramId>,
    ) -> Result<ScheduleSnapshot, BookingSystemError> {
        let extra = [("studio_room_id".to_string(), room_id.to_string())];
        let query = json!({ "date": date.format("%Y-%m-%d").to_string() });
        let response: Data<ScheduleSection> = self
            .client
            .get(
                "/reservation/reservations/choice/schedule",
                Some(&query),
                &extra,
            )
            .await?;
        response
            .data
            .schedule
            .into_snapshot(room_id, date, &self.tz, program_filter)
    }
}

#[async_trait]
impl BookingSystem for UpstreamBookingService {
    async fn list_studios(&self) -> Result<Vec<Studio>, BookingSystemError> {
        let query = json!({ "is_active": true });
        let response: Data<StudiosSection> =
            self.client.get_master("/master/studios", Some(&query)).await?;
        Ok(response
            .data
            .studios
            .into_list()
            .into_iter()
            .map(Studio::from)
            .collect())
    }

    async fn list_programs(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Program>, BookingSystemError> {
        let query = json!({ "studio_id": studio_id, "is_active": true });
        let response: Data<ProgramsSection> =
            self.client.get_master("/master/programs", Some(&query)).await?;
        Ok(response
            .data
            .programs
            .into_list()
            .into_iter()
            .map(Program::from)
            .collect())
    }

    async fn list_rooms(&self, studio_id: StudioId) -> Result<Vec<Room>, BookingSystemError> {
        let query = json!({ "studio_id": studio_id });
        let response: Data<RoomsSection> = self
            .client
            .get_master("/master/studio-rooms", Some(&query))
            .await?;
        Ok(response
            .data
            .studio_rooms
            .into_list()
            .into_iter()
            .map(Room::from)
            .collect())
    }

    async fn list_room_seats(&self, room_id: RoomId) -> Result<Vec<Seat>, BookingSystemError> {
        let path = format!("/master/studio-room-spaces/{room_id}");
        let response: Data<SpacesSection> = self.client.get_master(&path, None).await?;
        Ok(response
            .data
            .spaces
            .into_list()
            .into_iter()
            .map(Seat::from)
            .collect())
    }

    async fn list_staff(&self) -> Result<Vec<Candidate>, BookingSystemError> {
        let response: Data<InstructorsSection> =
            self.client.get_master("/master/instructors", None).await?;
        Ok(response
            .data
            .instructors
            .into_list()
            .into_iter()
            .map(Candidate::from)
            .collect())
    }

    async fn list_resources(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Candidate>, BookingSystemError> {
        let query = json!({ "studio_id": studio_id });
        let response: Data<ResourcesSection> =
            self.client.get_master("/master/resources", Some(&query)).await?;
        Ok(response
            .data
            .resources
            .into_list()
            .into_iter()
            .map(Candidate::from)
            .collect())
    }

    async fn fetch_session(&self, session_id: SessionId) -> Result<Session, BookingSystemError> {
        let path = format!("/master/studio-lessons/{session_id}");
        let response: Data<LessonSection> = self.client.get_master(&path, None).await?;
        response.data.studio_lesson.into_session(&self.tz)
    }

    async fn fetch_schedule(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<ScheduleSnapshot, BookingSystemError> {
        self.fetch_schedule_inner(room_id, date, None).await
    }

    async fn fetch_range_schedule(
        &self,
        room_id: RoomId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        program_id: Option<ProgramId>,
    ) -> Result<Vec<ScheduleSnapshot>, BookingSystemError> {
        // The upstream has no range endpoint; one schedule read per day,
        // serialized here and throttled by the client's rate limiter.
        let mut snapshots = Vec::new();
        let mut date = date_from;
        while date <= date_to {
            snapshots.push(self.fetch_schedule_inner(room_id, date, program_id).await?);
            date = date.succ_opt().ok_or_else(|| {
                BookingSystemError::Parse(format!("date overflow after {date}"))
            })?;
        }
        Ok(snapshots)
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, BookingSystemError> {
        let mut query = serde_json::Map::new();
        if let Some(session_id) = filter.session_id {
            query.insert("studio_lesson_id".to_string(), json!(session_id));
        }
        if let Some(room_id) = filter.room_id {
            query.insert("studio_room_id".to_string(), json!(room_id));
        }
        if let Some(guest_id) = filter.guest_id {
            query.insert("member_id".to_string(), json!(guest_id));
        }
        if let Some(from) = filter.date_from {
            query.insert(
                "date_from".to_string(),
                json!(from.format("%Y-%m-%d").to_string()),
            );
        }
        if let Some(to) = filter.date_to {
            query.insert(
                "date_to".to_string(),
                json!(to.format("%Y-%m-%d").to_string()),
            );
        }
        let query = serde_json::Value::Object(query);
        let response: Data<ReservationsSection> = self
            .client
            .get("/reservation/reservations", Some(&query), &[])
            .await?;
        response
            .data
            .reservations
            .into_list()
            .iter()
            .map(|raw| raw.normalize(&self.tz))
            .collect()
    }

    async fn find_guest_by_email(
        &self,
        email: &str,
    ) -> Result<Option<GuestId>, BookingSystemError> {
        let query = json!({ "mail_address": email });
        let response: Data<MembersSection> = self
            .client
            .get("/member/members", Some(&query), &[])
            .await?;
        Ok(response
            .data
            .members
            .into_list()
            .first()
            .map(|member| member.id))
    }

    async fn create_guest(&self, guest: &NewGuest) -> Result<GuestId, BookingSystemError> {
        let body = json!({
            "last_name": guest.last_name,
            "first_name": guest.first_name,
            "mail_address": guest.email,
            "tel": guest.phone,
            "studio_id": guest.studio_id,
            "password": guest.password,
            "is_guest": true,
        });
        let response: Data<MemberSection> =
            self.client.post("/member/members", &body).await?;
        debug!(guest_id = response.data.member.id, "Created guest account");
        Ok(response.data.member.id)
    }

    async fn grant_entitlement(
        &self,
        guest_id: GuestId,
        entitlement_id: EntitlementId,
        qty: u32,
    ) -> Result<EntitlementRef, BookingSystemError> {
        let path = format!("/member/members/{guest_id}/tickets");
        let body = json!({ "ticket_id": entitlement_id, "num": qty });
        let response: Data<MemberTicketSection> = self.client.post(&path, &body).await?;
        Ok(response.data.member_ticket.id)
    }

    async fn create_reservation(
        &self,
        payload: &ReservationPayload,
    ) -> Result<Reservation, BookingSystemError> {
        let response: Data<ReservationSection> = match payload {
            ReservationPayload::Fixed {
                guest_id,
                session_id,
                seat_no,
                entitlement_ref,
            } => {
                let body = json!({
                    "member_id": guest_id,
                    "studio_lesson_id": session_id,
                    "no": seat_no,
                    "member_ticket_id": entitlement_ref,
                });
                self.client
                    .post("/reservation/reservations/reserve", &body)
                    .await?
            }
            ReservationPayload::Free {
                guest_id,
                room_id,
                program_id,
                start,
                instructor_ids,
                resource_ids,
                entitlement_ref,
            } => {
                let resource_id_set: Vec<_> = resource_ids
                    .iter()
                    .map(|id| json!({ "resource_id": id }))
                    .collect();
                let body = json!({
                    "member_id": guest_id,
                    "studio_room_id": room_id,
                    "program_id": program_id,
                    "start_at": format_upstream_datetime(*start, &self.tz),
                    "instructor_ids": instructor_ids,
                    "resource_id_set": resource_id_set,
                    "ticket_id": entitlement_ref,
                    "is_send_mail": false,
                });
                self.client
                    .post("/reservation/reservations/choice/reserve", &body)
                    .await?
            }
        };
        response.data.reservation.normalize(&self.tz)
    }

    async fn cancel_reservation(
        &self,
        guest_id: GuestId,
        reservation_ids: &[ReservationId],
    ) -> Result<(), BookingSystemError> {
        let body = json!({ "member_id": guest_id, "ids": reservation_ids });
        let _: serde_json::Value = self
            .client
            .put("/reservation/reservations/cancel", &body)
            .await?;
        Ok(())
    }
}
