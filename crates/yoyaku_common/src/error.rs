// --- File: crates/yoyaku_common/src/error.rs ---
use thiserror::Error;

/// Errors returned by the booking-system adapter.
///
/// This is the one error type the core ever sees from upstream calls;
/// network, auth and domain failures are all normalized into it at the
/// adapter boundary.
#[derive(Error, Debug)]
pub enum BookingSystemError {
    /// The access token was rejected and could not be refreshed.
    #[error("Upstream authentication failed: {0}")]
    Auth(String),

    /// The upstream throttled the call and retries were exhausted.
    #[error("Upstream rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The upstream understood the request and rejected it for a domain
    /// reason (double booking, suspended member, ...).
    #[error("Upstream rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Network failure or a 5xx from the upstream.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered with a payload the adapter could not decode.
    #[error("Failed to parse upstream response: {0}")]
    Parse(String),

    /// A referenced entity does not exist upstream.
    #[error("Not found upstream: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for BookingSystemError {
    fn from(err: reqwest::Error) -> Self {
        BookingSystemError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for BookingSystemError {
    fn from(err: serde_json::Error) -> Self {
        BookingSystemError::Parse(err.to_string())
    }
}

/// A trait for converting errors to HTTP status codes.
///
/// Implemented by error types so handlers can map any failure to a
/// response status without matching on concrete variants.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for BookingSystemError {
    fn status_code(&self) -> u16 {
        match self {
            BookingSystemError::Auth(_) => 502,
            BookingSystemError::RateLimited { .. } => 429,
            BookingSystemError::Rejected { .. } => 400,
            BookingSystemError::Unavailable(_) => 502,
            BookingSystemError::Parse(_) => 502,
            BookingSystemError::NotFound(_) => 404,
        }
    }
}
