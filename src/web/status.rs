//! Health and job status handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{trace, warn};

use crate::ingest::JobStatus;
use crate::state::{AppState, ServiceStatus};

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    status: ServiceStatus,
    since_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    commit: &'static str,
    database: DatabaseHealth,
    services: BTreeMap<String, ServiceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_entries: Option<usize>,
    timestamp: String,
}

/// `GET /health`: 200 when the database answers, 503 otherwise.
pub(super) async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    trace!("health check requested");

    let database = match crate::data::health::ping(&state.db_pool, DB_PING_TIMEOUT).await {
        Ok(latency) => DatabaseHealth {
            connected: true,
            latency_ms: Some(latency.as_millis() as u64),
        },
        Err(e) => {
            warn!(error = ?e, "Health check database ping failed");
            DatabaseHealth {
                connected: false,
                latency_ms: None,
            }
        }
    };

    let services = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, since_secs)| (name, ServiceInfo { status, since_secs }))
        .collect();

    let (code, status) = if database.connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("GIT_COMMIT_HASH"),
            database,
            services,
            cache_entries: state.cache.entry_count().await,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

/// `GET /status`: the ingestion job status.
pub(super) async fn status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.orchestrator.status())
}
