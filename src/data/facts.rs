//! District-month fact table: row types, the write-side store, and queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// Typed metrics for one district-month.
#[derive(sqlx::FromRow, Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactMetrics {
    pub households_provided: i64,
    pub person_days: f64,
    pub avg_days_per_household: i64,
    pub avg_wage_rate: f64,
    pub works_started: i64,
    pub works_ongoing: i64,
    pub works_completed: i64,
    pub women_persondays: f64,
    pub sc_persondays: f64,
    pub st_persondays: f64,
    pub total_wages_paid: f64,
    pub material_expenditure: f64,
    pub admin_expenditure: f64,
    pub total_expenditure: f64,
}

/// A fact ready to be written, keyed by `(district_code, fin_year, month)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub state_code: String,
    pub district_code: String,
    pub district_name: Option<String>,
    pub fin_year: String,
    /// Calendar month, 1 through 12.
    pub month: i16,
    pub metrics: FactMetrics,
    pub source_url: String,
}

/// A fact as stored.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFact {
    pub state_code: String,
    pub district_code: String,
    pub district_name: Option<String>,
    pub fin_year: String,
    pub month: i16,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: FactMetrics,
    pub data_source: String,
    pub source_url: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("record {key} has no valid fact key: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("database write failed")]
    Database(#[from] sqlx::Error),
}

/// Write side of the fact table.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert the row, or overwrite every metric of the existing row with the same key.
    async fn upsert(&self, row: &FactRow) -> Result<(), WriteError>;
}

#[derive(Clone)]
pub struct PgFactStore {
    pool: PgPool,
}

impl PgFactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactStore for PgFactStore {
    async fn upsert(&self, row: &FactRow) -> Result<(), WriteError> {
        upsert_fact(&self.pool, row).await
    }
}

const FACT_SELECT: &str = "SELECT state_code, district_code, district_name, fin_year, month, \
     households_provided, person_days, avg_days_per_household, avg_wage_rate, \
     works_started, works_ongoing, works_completed, \
     women_persondays, sc_persondays, st_persondays, \
     total_wages_paid, material_expenditure, admin_expenditure, total_expenditure, \
     data_source, source_url, ingested_at \
     FROM mgnrega_monthly_facts";

/// Insert or update one fact. Re-running with the same row leaves identical metrics.
pub async fn upsert_fact(pool: &PgPool, row: &FactRow) -> Result<(), WriteError> {
    let m = &row.metrics;
    sqlx::query(
        r#"
        INSERT INTO mgnrega_monthly_facts (
            state_code, district_code, district_name, fin_year, month,
            households_provided, person_days, avg_days_per_household, avg_wage_rate,
            works_started, works_ongoing, works_completed,
            women_persondays, sc_persondays, st_persondays,
            total_wages_paid, material_expenditure, admin_expenditure, total_expenditure,
            data_source, source_url
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, 'OGD', $20)
        ON CONFLICT (district_code, fin_year, month)
        DO UPDATE SET
            state_code = EXCLUDED.state_code,
            district_name = COALESCE(EXCLUDED.district_name, mgnrega_monthly_facts.district_name),
            households_provided = EXCLUDED.households_provided,
            person_days = EXCLUDED.person_days,
            avg_days_per_household = EXCLUDED.avg_days_per_household,
            avg_wage_rate = EXCLUDED.avg_wage_rate,
            works_started = EXCLUDED.works_started,
            works_ongoing = EXCLUDED.works_ongoing,
            works_completed = EXCLUDED.works_completed,
            women_persondays = EXCLUDED.women_persondays,
            sc_persondays = EXCLUDED.sc_persondays,
            st_persondays = EXCLUDED.st_persondays,
            total_wages_paid = EXCLUDED.total_wages_paid,
            material_expenditure = EXCLUDED.material_expenditure,
            admin_expenditure = EXCLUDED.admin_expenditure,
            total_expenditure = EXCLUDED.total_expenditure,
            data_source = EXCLUDED.data_source,
            source_url = EXCLUDED.source_url,
            ingested_at = now()
        "#,
    )
    .bind(&row.state_code)
    .bind(&row.district_code)
    .bind(&row.district_name)
    .bind(&row.fin_year)
    .bind(row.month)
    .bind(m.households_provided)
    .bind(m.person_days)
    .bind(m.avg_days_per_household)
    .bind(m.avg_wage_rate)
    .bind(m.works_started)
    .bind(m.works_ongoing)
    .bind(m.works_completed)
    .bind(m.women_persondays)
    .bind(m.sc_persondays)
    .bind(m.st_persondays)
    .bind(m.total_wages_paid)
    .bind(m.material_expenditure)
    .bind(m.admin_expenditure)
    .bind(m.total_expenditure)
    .bind(&row.source_url)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch one district-month fact.
pub async fn get_fact(
    pool: &PgPool,
    district_code: &str,
    fin_year: &str,
    month: i16,
) -> Result<Option<StoredFact>, sqlx::Error> {
    sqlx::query_as::<_, StoredFact>(&format!(
        "{FACT_SELECT} WHERE district_code = $1 AND fin_year = $2 AND month = $3"
    ))
    .bind(district_code)
    .bind(fin_year)
    .bind(month)
    .fetch_optional(pool)
    .await
}

/// Number of facts stored for a fiscal year, or in total.
pub async fn count_facts(pool: &PgPool, fin_year: Option<&str>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM mgnrega_monthly_facts WHERE $1::text IS NULL OR fin_year = $1",
    )
    .bind(fin_year)
    .fetch_one(pool)
    .await
}
