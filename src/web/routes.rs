//! Web API router construction.

use axum::Router;
use axum::routing::{delete, get, post};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::web::{admin, districts, status, trigger};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the web server router.
///
/// Admin routes are only mounted when an admin key is configured.
pub fn create_router(app_state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/trigger", post(trigger::trigger))
        .route(
            "/api/v1/districts/{code}/summary",
            get(districts::district_summary),
        );

    if app_state.admin_api_key.is_some() {
        router = router
            .route("/admin/cache", delete(admin::flush_cache))
            .route("/admin/cache/stats", get(admin::cache_stats))
            .route("/admin/cache/refresh", post(admin::refresh_cache))
            .route("/admin/cache/{key}", delete(admin::delete_cache_key))
            .route("/admin/ingestion-status", get(admin::ingestion_status))
            .route("/admin/trigger-ingestion", post(admin::trigger_ingestion));
    }

    router.with_state(app_state).layer((
        TraceLayer::new_for_http(),
        TimeoutLayer::new(REQUEST_TIMEOUT),
        CorsLayer::permissive(),
    ))
}
