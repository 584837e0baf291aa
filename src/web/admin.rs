//! Admin API handlers.
//!
//! Every handler takes the [`AdminKey`] extractor, which answers 401 unless
//! the `X-API-Key` header matches the configured admin key.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::response::{Json, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::cache::CacheStats;
use crate::cache::keys::InvalidationPlan;
use crate::ingest::JobStatus;
use crate::state::AppState;
use crate::web::error::{ApiError, ApiErrorCode};

const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried the admin key.
pub struct AdminKey;

impl FromRequestParts<AppState> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_api_key.as_deref() else {
            return Err(ApiError::new(ApiErrorCode::Unauthorized, "Admin API disabled"));
        };
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if keys_match(provided.as_bytes(), expected.as_bytes()) {
            Ok(AdminKey)
        } else {
            warn!(
                path = %parts.uri.path(),
                key_present = !provided.is_empty(),
                "Unauthorized admin request"
            );
            Err(ApiError::new(ApiErrorCode::Unauthorized, "Unauthorized"))
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// `DELETE /admin/cache/{key}`: delete one key, or every key under a `prefix*`.
#[instrument(skip_all, fields(key = %key))]
pub(super) async fn delete_cache_key(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = if key.ends_with('*') {
        state.cache.invalidate_pattern(&key).await
    } else {
        state.cache.invalidate(&key).await.map(usize::from)
    }
    .map_err(|e| {
        warn!(error = ?e, "Cache delete failed");
        ApiError::new(ApiErrorCode::CacheUnavailable, "Failed to delete cache")
    })?;

    info!(deleted, "Cache key deleted");
    Ok(Json(json!({
        "message": format!("Cache key deleted: {key}"),
        "deleted": deleted,
    })))
}

/// `DELETE /admin/cache`: drop every entry.
pub(super) async fn flush_cache(
    _admin: AdminKey,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let flushed = state.cache.flush().await.map_err(|e| {
        warn!(error = ?e, "Cache flush failed");
        ApiError::new(ApiErrorCode::CacheUnavailable, "Failed to clear cache")
    })?;
    Ok(Json(json!({
        "message": "All cache cleared successfully",
        "deleted": flushed,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    stats: CacheStats,
    entries: Option<usize>,
}

/// `GET /admin/cache/stats`
pub(super) async fn cache_stats(
    _admin: AdminKey,
    State(state): State<AppState>,
) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        stats: state.cache.stats(),
        entries: state.cache.entry_count().await,
    })
}

/// `POST /admin/cache/refresh`: apply the post-ingestion invalidation plan now.
pub(super) async fn refresh_cache(
    _admin: AdminKey,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let plan: &InvalidationPlan = &state.orchestrator.config().invalidation;
    let report = state.cache.invalidate_plan(plan).await;
    if !report.failures.is_empty() {
        return Err(ApiError::new(
            ApiErrorCode::CacheUnavailable,
            format!("Failed to invalidate: {}", report.failures.join(", ")),
        ));
    }
    info!(deleted = report.deleted, "Cache invalidated on request");
    Ok(Json(json!({
        "message": "Cache invalidated successfully",
        "deleted": report.deleted,
    })))
}

/// `GET /admin/ingestion-status`
pub(super) async fn ingestion_status(
    _admin: AdminKey,
    State(state): State<AppState>,
) -> Json<JobStatus> {
    Json(state.orchestrator.status())
}

/// `POST /admin/trigger-ingestion`: same contract as `POST /trigger`.
pub(super) async fn trigger_ingestion(_admin: AdminKey, state: State<AppState>) -> Response {
    super::trigger::trigger(state).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        assert!(keys_match(b"s3cret", b"s3cret"));
        assert!(!keys_match(b"s3cres", b"s3cret"));
        assert!(!keys_match(b"s3c", b"s3cret"));
        assert!(!keys_match(b"", b"s3cret"));
    }
}
