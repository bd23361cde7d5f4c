// --- File: crates/yoyaku_common/src/lib.rs ---

// Declare modules within this crate
pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod services; // Service abstractions and the normalized domain model

// Re-export error types for easier access
pub use error::{BookingSystemError, HttpStatusCode};

// Re-export the shared HTTP client for easier access
pub use http::client::HTTP_CLIENT;
