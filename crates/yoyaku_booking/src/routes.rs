// --- File: crates/yoyaku_booking/src/routes.rs ---

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{
    book_fixed_handler, book_free_handler, cancel_handler, health_handler,
    refresh_handler, reservation_detail_handler, BookingState,
};

/// Creates a router containing all booking routes.
pub fn routes(state: Arc<BookingState>) -> Router {
    Router::new()
        .route("/reservations", post(book_fixed_handler))
        .route("/reservations/choice", post(book_free_handler))
        .route("/reservations/{id}", get(reservation_detail_handler))
        .route("/reservations/{id}/cancel", post(cancel_handler))
        .route("/cache/refresh", post(refresh_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
