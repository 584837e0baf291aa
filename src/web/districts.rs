//! District read endpoints, served cache-aside.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheCategory, Cached, keys};
use crate::data::facts::{StoredFact, get_fact};
use crate::ogd::models::{FiscalYear, month_number};
use crate::state::AppState;
use crate::web::error::{ApiError, db_error};

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub year: String,
    /// Month number (`10`) or name (`Oct`, `October`).
    pub month: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryBody {
    pub summary: Option<StoredFactView>,
}

/// Cached form of a fact; timestamps are kept as RFC 3339 text.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFactView {
    pub district_code: String,
    pub district_name: Option<String>,
    pub fin_year: String,
    pub month: i16,
    pub metrics: serde_json::Value,
    pub data_source: String,
    pub ingested_at: String,
}

impl StoredFactView {
    fn from_fact(fact: StoredFact) -> Result<Self, serde_json::Error> {
        Ok(Self {
            metrics: serde_json::to_value(&fact.metrics)?,
            district_code: fact.district_code,
            district_name: fact.district_name,
            fin_year: fact.fin_year,
            month: fact.month,
            data_source: fact.data_source,
            ingested_at: fact.ingested_at.to_rfc3339(),
        })
    }
}

fn parse_month(text: &str) -> Option<u32> {
    match text.trim().parse::<u32>() {
        Ok(n) if (1..=12).contains(&n) => Some(n),
        Ok(_) => None,
        Err(_) => month_number(text),
    }
}

/// `GET /api/v1/districts/{code}/summary?year=2024-2025&month=10`
pub(super) async fn district_summary(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Cached<SummaryBody>>, ApiError> {
    let fin_year: FiscalYear = params
        .year
        .parse()
        .map_err(|e| ApiError::bad_request(format!("{e}")))?;
    let month = parse_month(&params.month)
        .ok_or_else(|| ApiError::bad_request(format!("invalid month '{}'", params.month)))?;
    let code = code.trim().to_string();

    let key = keys::district_summary(&code, fin_year.as_str(), month);
    let cached = state
        .cache
        .get_or_compute(&key, CacheCategory::Budget, || async {
            let fact = get_fact(&state.db_pool, &code, fin_year.as_str(), month as i16)
                .await
                .map_err(|e| db_error("District summary query", e))?;
            let summary = fact
                .map(StoredFactView::from_fact)
                .transpose()
                .map_err(|e| db_error("District summary encoding", e))?;
            Ok::<_, ApiError>(SummaryBody { summary })
        })
        .await?;

    if cached.value.summary.is_none() {
        return Err(ApiError::not_found(format!(
            "no data for district {code} in {fin_year} month {month}"
        )));
    }
    Ok(Json(cached))
}
