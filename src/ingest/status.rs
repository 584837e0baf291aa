//! Observable state of the ingestion job.

use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub periods_completed: usize,
    pub records_fetched: usize,
    pub duplicates_dropped: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
    pub fields_defaulted: usize,
    pub cache_keys_invalidated: usize,
}

/// Process-wide job status. Lives in memory only; a restart begins at zero.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: &'static str,
    pub is_running: bool,
    pub current_run_id: Option<Ulid>,
    pub current_trigger: Option<TriggerSource>,
    pub total_runs: u64,
    pub failed_runs: u64,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunOutcome>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_report: Option<RunReport>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub const JOB_ID: &'static str = "mgnrega-ingestion";
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            job_id: Self::JOB_ID,
            is_running: false,
            current_run_id: None,
            current_trigger: None,
            total_runs: 0,
            failed_runs: 0,
            last_run_started_at: None,
            last_run_finished_at: None,
            last_run_status: None,
            last_duration_ms: None,
            last_error: None,
            last_report: None,
            next_run_at: None,
        }
    }
}
