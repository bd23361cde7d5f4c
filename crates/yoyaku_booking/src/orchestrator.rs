// --- File: crates/yoyaku_booking/src/orchestrator.rs ---
//! Multi-step reservation orchestration.
//!
//! Both booking flows run the same shape: validate the requested time,
//! resolve (or create) the guest account, grant an entitlement, resolve
//! availability against a cached snapshot, then commit a single
//! reservation call upstream. Steps run strictly in order and there is
//! no compensation: the commit is the only step with side effects a
//! guest can see, and everything before it is re-runnable. Entitlements
//! are granted before availability resolution; a grant issued ahead of a
//! later failure is not reclaimed.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use uuid::Uuid;

use yoyaku_common::services::{
    BookingSystem, CandidateId, EntitlementRef, GuestId, NewGuest, Program, ProgramId,
    Reservation, ReservationFilter, ReservationId, ReservationPayload, RoomId, SessionId,
    StudioId,
};
use yoyaku_config::BookingConfig;

use crate::availability::{resolve_candidates, resolve_seat, CandidatePool, SlotRequest};
use crate::cache::MasterCache;
use crate::error::BookingError;
use crate::verify::{generate_token, normalize_email, normalize_phone, verify_token};

/// Contact fields supplied by the guest on every booking.
#[derive(Debug, Clone)]
pub struct GuestRequest {
    /// Display name, "last first" or a single token.
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A fixed-slot booking: a numbered seat in a pre-scheduled session.
#[derive(Debug, Clone)]
pub struct FixedBookingRequest {
    pub session_id: SessionId,
    pub guest: GuestRequest,
}

/// A free-slot booking: an appointment at an arbitrary start time.
#[derive(Debug, Clone)]
pub struct FreeBookingRequest {
    pub room_id: RoomId,
    pub program_id: ProgramId,
    pub start: DateTime<Utc>,
    pub guest: GuestRequest,
    /// Restrict staff assignment to these candidates. Empty = any staff.
    pub instructor_allow: Vec<CandidateId>,
}

/// What a successful booking returns to the guest.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub reservation: Reservation,
    pub guest_id: GuestId,
    /// Authorizes later detail lookup and cancellation together with the
    /// guest's contact fields.
    pub verify_token: String,
}

pub struct Orchestrator {
    system: Arc<dyn BookingSystem>,
    cache: Arc<MasterCache>,
    booking: BookingConfig,
    tz: Tz,
}

impl Orchestrator {
    pub fn new(
        system: Arc<dyn BookingSystem>,
        cache: Arc<MasterCache>,
        booking: BookingConfig,
    ) -> Result<Self, BookingError> {
        let tz: Tz = booking
            .time_zone
            .parse()
            .map_err(|_| BookingError::Validation(format!("unknown timezone {}", booking.time_zone)))?;
        Ok(Orchestrator {
            system,
            cache,
            booking,
            tz,
        })
    }

    /// Books a numbered seat in a fixed-slot session.
    pub async fn book_fixed(
        &self,
        request: &FixedBookingRequest,
    ) -> Result<BookingOutcome, BookingError> {
        let session = self.system.fetch_session(request.session_id).await?;
        self.validate_window(session.start, Utc::now())?;

        let guest_id = self.resolve_guest(&request.guest, session.studio_id).await?;

        let programs = self.cached_programs(session.studio_id).await?;
        let program = programs.iter().find(|p| p.id == session.program_id);
        let entitlement_ref = self.resolve_entitlement(guest_id, program).await;

        let seats = {
            let system = Arc::clone(&self.system);
            let room_id = session.room_id;
            self.cache
                .seats
                .get_or_refresh(room_id, || async move {
                    system.list_room_seats(room_id).await
                })
                .await?
        };
        if seats.is_empty() {
            return Err(BookingError::NoValidSeat);
        }

        let filter = ReservationFilter {
            session_id: Some(request.session_id),
            ..Default::default()
        };
        let existing = self.system.list_reservations(&filter).await?;
        let reserved: Vec<&str> = existing
            .iter()
            .filter(|r| r.status.occupies())
            .filter_map(|r| r.seat_no.as_deref())
            .collect();

        let seat_no = resolve_seat(&seats, reserved).ok_or(BookingError::SeatFull)?;
        let payload = ReservationPayload::Fixed {
            guest_id,
            session_id: request.session_id,
            seat_no: seat_no.to_string(),
            entitlement_ref,
        };
        let reservation = self.system.create_reservation(&payload).await?;
        info!(
            reservation_id = reservation.id,
            session_id = request.session_id,
            seat_no,
            "Fixed-slot reservation committed"
        );

        let date = self.business_date(session.start);
        Ok(self.finish_booking(reservation, guest_id, &request.guest, session.room_id, date))
    }

    /// Books a free-slot appointment, assigning staff (and resources when
    /// the program requires them) from the cached schedule snapshot.
    pub async fn book_free(
        &self,
        request: &FreeBookingRequest,
    ) -> Result<BookingOutcome, BookingError> {
        self.validate_window(request.start, Utc::now())?;
        let date = self.business_date(request.start);

        let snapshot = {
            let system = Arc::clone(&self.system);
            let room_id = request.room_id;
            self.cache
                .schedules
                .get_or_refresh((room_id, date), || async move {
                    system.fetch_schedule(room_id, date).await
                })
                .await?
        };

        let rooms = {
            let system = Arc::clone(&self.system);
            let studio_id = snapshot.studio_id;
            self.cache
                .rooms
                .get_or_refresh(studio_id, || async move {
                    system.list_rooms(studio_id).await
                })
                .await?
        };
        let room = rooms
            .iter()
            .find(|r| r.id == request.room_id)
            .ok_or_else(|| BookingError::Validation("unknown room".to_string()))?;
        if !room.free_slot_enabled {
            return Err(BookingError::Validation(
                "この部屋では時間指定のご予約を承っておりません。".to_string(),
            ));
        }

        let programs = self.cached_programs(snapshot.studio_id).await?;
        let program = programs
            .iter()
            .find(|p| p.id == request.program_id)
            .ok_or_else(|| BookingError::Validation("unknown program".to_string()))?;
        if !program.is_fully_configured() {
            return Err(BookingError::Validation(
                "このプログラムは現在ご予約いただけません。".to_string(),
            ));
        }

        let guest_id = self.resolve_guest(&request.guest, snapshot.studio_id).await?;
        let entitlement_ref = self.resolve_entitlement(guest_id, Some(program)).await;

        let staff = {
            let system = Arc::clone(&self.system);
            self.cache
                .staff
                .get_or_refresh((), || async move { system.list_staff().await })
                .await?
        };
        let staff_pool = if request.instructor_allow.is_empty() {
            CandidatePool::Unrestricted
        } else {
            CandidatePool::AllowList(request.instructor_allow.clone())
        };
        let slot = SlotRequest {
            studio_id: snapshot.studio_id,
            start: request.start,
            duration: Duration::minutes(program.duration_minutes),
            buffer_before: Duration::minutes(self.booking.buffer_before_minutes),
            buffer_after: Duration::minutes(self.booking.buffer_after_minutes),
            pool: staff_pool,
        };
        let instructor_id = *resolve_candidates(&staff, &snapshot, &slot)
            .first()
            .ok_or(BookingError::NoAvailableInstructor)?;

        let resource_ids = if program.resource_ids.is_empty() {
            Vec::new()
        } else {
            let resources = {
                let system = Arc::clone(&self.system);
                let studio_id = snapshot.studio_id;
                self.cache
                    .resources
                    .get_or_refresh(studio_id, || async move {
                        system.list_resources(studio_id).await
                    })
                    .await?
            };
            let resource_slot = SlotRequest {
                pool: CandidatePool::AllowList(program.resource_ids.clone()),
                ..slot.clone()
            };
            let resource_id = *resolve_candidates(&resources, &snapshot, &resource_slot)
                .first()
                .ok_or(BookingError::NoAvailableResource)?;
            vec![resource_id]
        };

        let payload = ReservationPayload::Free {
            guest_id,
            room_id: request.room_id,
            program_id: request.program_id,
            start: request.start,
            instructor_ids: vec![instructor_id],
            resource_ids,
            entitlement_ref,
        };
        let reservation = self.system.create_reservation(&payload).await?;
        info!(
            reservation_id = reservation.id,
            room_id = request.room_id,
            program_id = request.program_id,
            instructor_id,
            "Free-slot reservation committed"
        );

        Ok(self.finish_booking(reservation, guest_id, &request.guest, request.room_id, date))
    }

    /// Token-authorized detail lookup for a guest's own reservation.
    pub async fn reservation_detail(
        &self,
        reservation_id: ReservationId,
        email: &str,
        phone: &str,
        token: &str,
    ) -> Result<Reservation, BookingError> {
        let guest_id = self.authorize(email, phone, token).await?;
        let filter = ReservationFilter {
            guest_id: Some(guest_id),
            ..Default::default()
        };
        let reservations = self.system.list_reservations(&filter).await?;
        reservations
            .into_iter()
            .find(|r| r.id == reservation_id)
            .ok_or(BookingError::ReservationNotFound)
    }

    /// Token-authorized cancellation of a guest's own reservation.
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        email: &str,
        phone: &str,
        token: &str,
    ) -> Result<(), BookingError> {
        let guest_id = self.authorize(email, phone, token).await?;
        let filter = ReservationFilter {
            guest_id: Some(guest_id),
            ..Default::default()
        };
        let reservations = self.system.list_reservations(&filter).await?;
        let reservation = reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .ok_or(BookingError::ReservationNotFound)?;
        let freed = reservation
            .room_id
            .map(|room_id| (room_id, self.business_date(reservation.start)));

        self.system
            .cancel_reservation(guest_id, &[reservation_id])
            .await?;
        if let Some((room_id, date)) = freed {
            self.cache.invalidate_for_booking(room_id, date);
        }
        info!(reservation_id, guest_id, "Reservation cancelled");
        Ok(())
    }

    /// Verifies the contact/token triple and maps it to the guest account.
    async fn authorize(
        &self,
        email: &str,
        phone: &str,
        token: &str,
    ) -> Result<GuestId, BookingError> {
        if !verify_token(email, phone, &self.booking.token_salt, token) {
            return Err(BookingError::AuthFailed);
        }
        self.system
            .find_guest_by_email(&normalize_email(email))
            .await?
            .ok_or(BookingError::AuthFailed)
    }

    /// Checks the lead-time and horizon bounds, both inclusive.
    pub(crate) fn validate_window(
        &self,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let earliest = now + Duration::minutes(self.booking.min_lead_minutes);
        let latest = now + Duration::days(self.booking.max_horizon_days);
        if start < earliest {
            return Err(BookingError::OutOfRange(format!(
                "ご予約は{}分前までにお願いいたします。",
                self.booking.min_lead_minutes
            )));
        }
        if start > latest {
            return Err(BookingError::OutOfRange(format!(
                "ご予約は{}日先まで承っております。",
                self.booking.max_horizon_days
            )));
        }
        Ok(())
    }

    /// Reuses an existing guest account by normalized email, creating one
    /// upstream only when none exists.
    async fn resolve_guest(
        &self,
        guest: &GuestRequest,
        studio_id: StudioId,
    ) -> Result<GuestId, BookingError> {
        let email = normalize_email(&guest.email);
        if email.is_empty() || !email.contains('@') {
            return Err(BookingError::Validation(
                "メールアドレスをご確認ください。".to_string(),
            ));
        }
        let phone = normalize_phone(&guest.phone);
        if phone.is_empty() {
            return Err(BookingError::Validation(
                "電話番号をご確認ください。".to_string(),
            ));
        }

        if let Some(existing) = self.system.find_guest_by_email(&email).await? {
            info!(guest_id = existing, "Existing guest account reused");
            return Ok(existing);
        }

        let (last_name, first_name) = split_name(&guest.name);
        let new_guest = NewGuest {
            last_name,
            first_name,
            email,
            phone,
            studio_id,
            password: Uuid::new_v4().simple().to_string(),
        };
        let guest_id = self
            .system
            .create_guest(&new_guest)
            .await
            .map_err(|err| BookingError::GuestCreateFailed(err.to_string()))?;
        info!(guest_id, "Guest account created");
        Ok(guest_id)
    }

    /// Grants one entitlement unit ahead of the commit. Failure is logged
    /// and ignored; the upstream rejects the commit itself when the guest
    /// genuinely lacks a usable entitlement.
    async fn resolve_entitlement(
        &self,
        guest_id: GuestId,
        program: Option<&Program>,
    ) -> Option<EntitlementRef> {
        let entitlement_id = program
            .and_then(|p| p.entitlement_ids.first().copied())
            .or_else(|| program.and_then(|p| p.default_entitlement_id))
            .or(self.booking.default_entitlement_id)?;
        match self.system.grant_entitlement(guest_id, entitlement_id, 1).await {
            Ok(entitlement_ref) => Some(entitlement_ref),
            Err(err) => {
                warn!(guest_id, entitlement_id, error = %err, "Entitlement grant failed, continuing");
                None
            }
        }
    }

    async fn cached_programs(
        &self,
        studio_id: StudioId,
    ) -> Result<Vec<Program>, BookingError> {
        let system = Arc::clone(&self.system);
        Ok(self
            .cache
            .programs
            .get_or_refresh(studio_id, || async move {
                system.list_programs(studio_id).await
            })
            .await?)
    }

    fn business_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// Post-commit bookkeeping: derive the guest's verification token,
    /// drop the now-stale snapshots and refetch the day in the background.
    fn finish_booking(
        &self,
        reservation: Reservation,
        guest_id: GuestId,
        guest: &GuestRequest,
        room_id: RoomId,
        date: NaiveDate,
    ) -> BookingOutcome {
        let verify_token = generate_token(&guest.email, &guest.phone, &self.booking.token_salt);
        self.cache.invalidate_for_booking(room_id, date);

        let system = Arc::clone(&self.system);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            match system.fetch_schedule(room_id, date).await {
                Ok(snapshot) => cache.schedules.insert((room_id, date), snapshot),
                Err(err) => {
                    warn!(room_id, %date, error = %err, "Post-booking snapshot refetch failed")
                }
            }
        });

        BookingOutcome {
            reservation,
            guest_id,
            verify_token,
        }
    }
}

/// Splits a display name into (last, first) on whitespace. A single token
/// fills both fields, matching how walk-in accounts are registered.
fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(last), Some(first)) => (last.to_string(), first.to_string()),
        (Some(only), None) => (only.to_string(), only.to_string()),
        _ => (String::new(), String::new()),
    }
}
