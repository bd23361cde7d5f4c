// --- File: crates/services/yoyaku_backend/src/main.rs ---

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use yoyaku_adapter::service::UpstreamBookingService;
use yoyaku_booking::cache::MasterCache;
use yoyaku_booking::handlers::BookingState;
use yoyaku_booking::orchestrator::Orchestrator;
use yoyaku_booking::refresh::RefreshScheduler;
use yoyaku_booking::routes as booking_routes;
use yoyaku_common::services::BookingSystem;
use yoyaku_config::{ensure_dotenv_loaded, load_config};

#[tokio::main]
async fn main() {
    ensure_dotenv_loaded();
    yoyaku_common::logging::init();

    let config = load_config().expect("Failed to load config");

    let system: Arc<dyn BookingSystem> = Arc::new(
        UpstreamBookingService::new(&config.upstream, &config.booking.time_zone)
            .expect("Failed to build upstream client"),
    );
    let cache = Arc::new(MasterCache::new(&config.cache));

    let orchestrator = Arc::new(
        Orchestrator::new(Arc::clone(&system), Arc::clone(&cache), config.booking.clone())
            .expect("Failed to build orchestrator"),
    );
    let refresher = Arc::new(
        RefreshScheduler::new(
            Arc::clone(&system),
            Arc::clone(&cache),
            config.refresh.clone(),
            &config.booking.time_zone,
        )
        .expect("Failed to build refresh scheduler"),
    );

    if config.refresh.interval_secs > 0 {
        let refresher = Arc::clone(&refresher);
        let period = Duration::from_secs(config.refresh.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let report = refresher.refresh_all().await;
                if !report.errors.is_empty() {
                    error!(
                        failed = report.failed,
                        refreshed = report.refreshed,
                        "Periodic cache refresh had failures"
                    );
                }
            }
        });
    }

    let state = Arc::new(BookingState {
        orchestrator,
        refresher,
    });
    let app = Router::new()
        .nest(
            "/api",
            Router::new()
                .route("/", get(|| async { "Welcome to the Yoyaku API!" }))
                .merge(booking_routes::routes(state)),
        )
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    info!("Starting server at http://{addr}");

    axum::serve(listener, app.into_make_service())
        .await
        .expect("Server error");
}
