//! Manual ingestion trigger.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::info;

use crate::ingest::TriggerSource;
use crate::state::AppState;

/// `POST /trigger`: start a run, or report the one already in progress.
pub(super) async fn trigger(State(state): State<AppState>) -> Response {
    match state.orchestrator.trigger(TriggerSource::Manual) {
        Ok(run_id) => {
            info!(run_id = %run_id, "Manual ingestion run started");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "started",
                    "runId": run_id,
                    "message": "Ingestion run started",
                })),
            )
                .into_response()
        }
        Err(rejected) => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "already_running",
                "runId": rejected.running,
                "message": rejected.to_string(),
            })),
        )
            .into_response(),
    }
}
