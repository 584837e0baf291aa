//! Database health check query.

use crate::utils::fmt_duration;
use sqlx::PgPool;
use std::time::{Duration, Instant};

/// Verify the database answers, returning the round-trip time.
///
/// Bounded by `timeout` so a wedged pool cannot hang a health check.
pub async fn ping(pool: &PgPool, timeout: Duration) -> anyhow::Result<Duration> {
    let start = Instant::now();
    tokio::time::timeout(
        timeout,
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool),
    )
    .await
    .map_err(|_| anyhow::anyhow!("database ping timed out after {}", fmt_duration(timeout)))??;
    Ok(start.elapsed())
}
