// --- File: crates/yoyaku_booking/src/handlers.rs ---

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use yoyaku_common::error::HttpStatusCode;
use yoyaku_common::services::{GuestId, Reservation, ReservationId, ReservationStatus};

use crate::error::BookingError;
use crate::orchestrator::{
    BookingOutcome, FixedBookingRequest, FreeBookingRequest, GuestRequest, Orchestrator,
};
use crate::refresh::RefreshScheduler;

// Shared state for all booking routes
#[derive(Clone)]
pub struct BookingState {
    pub orchestrator: Arc<Orchestrator>,
    pub refresher: Arc<RefreshScheduler>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error_code: &'static str,
    pub message: String,
}

fn error_response(err: BookingError) -> (StatusCode, Json<ApiError>) {
    error!(error = %err, "Booking request failed");
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ApiError {
            success: false,
            error_code: err.error_code(),
            message: err.user_message(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct FixedBookingBody {
    pub session_id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct FreeBookingBody {
    pub room_id: i64,
    pub program_id: i64,
    /// RFC 3339 start time.
    pub start: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub instructor_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub success: bool,
    pub reservation_id: ReservationId,
    pub guest_id: GuestId,
    pub verify_token: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_no: Option<String>,
}

impl From<BookingOutcome> for BookingResponse {
    fn from(outcome: BookingOutcome) -> Self {
        BookingResponse {
            success: true,
            reservation_id: outcome.reservation.id,
            guest_id: outcome.guest_id,
            verify_token: outcome.verify_token,
            start: outcome.reservation.start,
            end: outcome.reservation.end,
            seat_no: outcome.reservation.seat_no,
        }
    }
}

/// Handler for fixed-slot (numbered seat) bookings.
#[axum::debug_handler]
pub async fn book_fixed_handler(
    State(state): State<Arc<BookingState>>,
    Json(body): Json<FixedBookingBody>,
) -> Result<(StatusCode, Json<BookingResponse>), (StatusCode, Json<ApiError>)> {
    let request = FixedBookingRequest {
        session_id: body.session_id,
        guest: GuestRequest {
            name: body.name,
            email: body.email,
            phone: body.phone,
        },
    };
    let outcome = state
        .orchestrator
        .book_fixed(&request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Handler for free-slot (time of choice) bookings.
#[axum::debug_handler]
pub async fn book_free_handler(
    State(state): State<Arc<BookingState>>,
    Json(body): Json<FreeBookingBody>,
) -> Result<(StatusCode, Json<BookingResponse>), (StatusCode, Json<ApiError>)> {
    let start = DateTime::parse_from_rfc3339(&body.start)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            error_response(BookingError::Validation(
                "開始時刻の形式が正しくありません。".to_string(),
            ))
        })?;
    let request = FreeBookingRequest {
        room_id: body.room_id,
        program_id: body.program_id,
        start,
        guest: GuestRequest {
            name: body.name,
            email: body.email,
            phone: body.phone,
        },
        instructor_allow: body.instructor_ids,
    };
    let outcome = state
        .orchestrator
        .book_free(&request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub email: String,
    pub phone: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ReservationDetailResponse {
    pub success: bool,
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_no: Option<String>,
}

impl From<Reservation> for ReservationDetailResponse {
    fn from(reservation: Reservation) -> Self {
        ReservationDetailResponse {
            success: true,
            reservation_id: reservation.id,
            status: reservation.status,
            start: reservation.start,
            end: reservation.end,
            seat_no: reservation.seat_no,
        }
    }
}

/// Handler for token-authorized reservation detail lookup.
#[axum::debug_handler]
pub async fn reservation_detail_handler(
    State(state): State<Arc<BookingState>>,
    Path(reservation_id): Path<ReservationId>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<ReservationDetailResponse>, (StatusCode, Json<ApiError>)> {
    let reservation = state
        .orchestrator
        .reservation_detail(reservation_id, &query.email, &query.phone, &query.token)
        .await
        .map_err(error_response)?;
    Ok(Json(reservation.into()))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub email: String,
    pub phone: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Handler for token-authorized cancellation.
#[axum::debug_handler]
pub async fn cancel_handler(
    State(state): State<Arc<BookingState>>,
    Path(reservation_id): Path<ReservationId>,
    Json(body): Json<CancelBody>,
) -> Result<Json<CancelResponse>, (StatusCode, Json<ApiError>)> {
    state
        .orchestrator
        .cancel(reservation_id, &body.email, &body.phone, &body.token)
        .await
        .map_err(error_response)?;
    Ok(Json(CancelResponse {
        success: true,
        message: "ご予約をキャンセルしました。".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct RefreshAccepted {
    pub success: bool,
    pub message: String,
}

/// Handler kicking off a cache refresh batch. Returns 202 immediately;
/// the batch runs detached and logs its own report.
#[axum::debug_handler]
pub async fn refresh_handler(
    State(state): State<Arc<BookingState>>,
) -> (StatusCode, Json<RefreshAccepted>) {
    let refresher = Arc::clone(&state.refresher);
    tokio::spawn(async move {
        refresher.refresh_all().await;
    });
    (
        StatusCode::ACCEPTED,
        Json(RefreshAccepted {
            success: true,
            message: "refresh started".to_string(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[axum::debug_handler]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
