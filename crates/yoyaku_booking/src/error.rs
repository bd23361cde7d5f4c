// --- File: crates/yoyaku_booking/src/error.rs ---
//! The booking error taxonomy.
//!
//! Every failure a guest can observe is one of these variants. Each
//! carries an `error_code` for clients and a localized `user_message`;
//! raw diagnostics stay in the `Display` output and the logs and are
//! never sent to the guest.

use thiserror::Error;
use yoyaku_common::error::{BookingSystemError, HttpStatusCode};

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested start violates the lead-time or horizon bound. The
    /// payload is already the localized message naming the bound.
    #[error("requested time out of range: {0}")]
    OutOfRange(String),

    #[error("failed to create guest account: {0}")]
    GuestCreateFailed(String),

    #[error("session has no free seat")]
    SeatFull,

    #[error("room has no seat numbering configured")]
    NoValidSeat,

    #[error("no instructor available for the requested slot")]
    NoAvailableInstructor,

    #[error("no resource available for the requested slot")]
    NoAvailableResource,

    #[error("upstream rejected the booking ({code}): {message}")]
    UpstreamRejected { code: String, message: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("verification token mismatch")]
    AuthFailed,

    #[error("reservation not found")]
    ReservationNotFound,
}

/// Fixed translation table for upstream rejection codes. Unknown codes
/// fall back to the message embedded in the rejection body, then to a
/// generic message.
const UPSTREAM_CODE_MESSAGES: &[(&str, &str)] = &[
    ("E40001", "この枠は満席です。別の時間帯をお選びください。"),
    ("E40002", "同じ時間帯にすでにご予約があります。"),
    ("E40003", "このアカウントではご予約いただけません。店舗までお問い合わせください。"),
    ("E40004", "ご利用可能なチケットがありません。"),
    ("E42201", "営業時間外のためご予約いただけません。"),
];

const GENERIC_FAILURE_MESSAGE: &str = "予約に失敗しました。時間をおいて再度お試しください。";

impl BookingError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "VALIDATION",
            BookingError::OutOfRange(_) => "OUT_OF_RANGE",
            BookingError::GuestCreateFailed(_) => "GUEST_CREATE_FAILED",
            BookingError::SeatFull => "SEAT_FULL",
            BookingError::NoValidSeat => "NO_VALID_SEAT",
            BookingError::NoAvailableInstructor => "NO_AVAILABLE_INSTRUCTOR",
            BookingError::NoAvailableResource => "NO_AVAILABLE_RESOURCE",
            BookingError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            BookingError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            BookingError::RateLimited { .. } => "RATE_LIMITED",
            BookingError::AuthFailed => "AUTH_FAILED",
            BookingError::ReservationNotFound => "RESERVATION_NOT_FOUND",
        }
    }

    /// The localized message returned to the guest.
    pub fn user_message(&self) -> String {
        match self {
            BookingError::Validation(message) => message.clone(),
            BookingError::OutOfRange(message) => message.clone(),
            BookingError::GuestCreateFailed(_) => {
                "会員登録に失敗しました。入力内容をご確認ください。".to_string()
            }
            BookingError::SeatFull => {
                "この回は満席です。別の回をお選びください。".to_string()
            }
            BookingError::NoValidSeat => {
                "この部屋には座席が設定されていません。".to_string()
            }
            BookingError::NoAvailableInstructor => {
                "ご希望の時間に空いているスタッフがいません。".to_string()
            }
            BookingError::NoAvailableResource => {
                "ご希望の時間に空いている設備がありません。".to_string()
            }
            BookingError::UpstreamRejected { code, message } => UPSTREAM_CODE_MESSAGES
                .iter()
                .find(|(known, _)| known == code)
                .map(|(_, localized)| localized.to_string())
                .unwrap_or_else(|| {
                    if message.trim().is_empty() {
                        GENERIC_FAILURE_MESSAGE.to_string()
                    } else {
                        message.clone()
                    }
                }),
            BookingError::UpstreamUnavailable(_) | BookingError::RateLimited { .. } => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            BookingError::AuthFailed => "認証に失敗しました。".to_string(),
            BookingError::ReservationNotFound => "ご予約が見つかりませんでした。".to_string(),
        }
    }
}

impl HttpStatusCode for BookingError {
    fn status_code(&self) -> u16 {
        match self {
            BookingError::Validation(_)
            | BookingError::OutOfRange(_)
            | BookingError::GuestCreateFailed(_)
            | BookingError::SeatFull
            | BookingError::NoValidSeat
            | BookingError::NoAvailableInstructor
            | BookingError::NoAvailableResource
            | BookingError::UpstreamRejected { .. } => 400,
            BookingError::AuthFailed => 401,
            BookingError::ReservationNotFound => 404,
            BookingError::RateLimited { .. } => 429,
            BookingError::UpstreamUnavailable(_) => 502,
        }
    }
}

impl From<BookingSystemError> for BookingError {
    fn from(err: BookingSystemError) -> Self {
        match err {
            BookingSystemError::Rejected { code, message } => {
                BookingError::UpstreamRejected { code, message }
            }
            BookingSystemError::RateLimited { retry_after_secs } => {
                BookingError::RateLimited { retry_after_secs }
            }
            other => BookingError::UpstreamUnavailable(other.to_string()),
        }
    }
}
