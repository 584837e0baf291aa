//! Runs ingestion: fetch, reconcile, and write each reporting period, then
//! invalidate the cache.
//!
//! At most one run exists at a time. Admission is a compare-and-swap on a flag
//! owned by [`RunGuard`]; the guard writes the final [`JobStatus`] before it
//! clears the flag, so an observer that sees `is_running == false` also sees
//! the outcome of the run that just ended.

use crate::cache::CacheLayer;
use crate::cache::keys::InvalidationPlan;
use crate::data::facts::FactStore;
use crate::ingest::fetch::{FetchOptions, PageSource, RequestPacer, fetch_period};
use crate::ingest::reconcile::reconcile;
use crate::ingest::status::{JobStatus, RunOutcome, RunReport, TriggerSource};
use crate::ingest::writer::{RowContext, write_batch};
use crate::ogd::{FetchError, RegionScope, ReportingPeriod};
use crate::utils::fmt_duration;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, instrument, warn};
use ulid::Ulid;

/// A run was requested while another was in progress.
#[derive(Debug, Clone, thiserror::Error)]
#[error("ingestion is already running")]
pub struct ConcurrencyRejected {
    pub running: Option<Ulid>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to fetch {period}: {source}")]
    Fetch {
        period: String,
        #[source]
        source: FetchError,
    },
}

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub periods: Vec<ReportingPeriod>,
    pub scope: RegionScope,
    pub fetch: FetchOptions,
    pub rows: RowContext,
    pub invalidation: InvalidationPlan,
}

/// Result of a run awaited with [`Orchestrator::run_now`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Ulid,
    pub outcome: RunOutcome,
    pub report: RunReport,
    pub error: Option<String>,
}

struct Inner {
    source: Arc<dyn PageSource>,
    /// Outlives every run, so request spacing holds across periods and runs.
    pacer: RequestPacer,
    store: Arc<dyn FactStore>,
    cache: CacheLayer,
    config: PipelineConfig,
    running: AtomicBool,
    /// `true` while no run is in progress.
    idle: watch::Sender<bool>,
    status: RwLock<JobStatus>,
}

impl Inner {
    fn update_status(&self, f: impl FnOnce(&mut JobStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn FactStore>,
        cache: CacheLayer,
        config: PipelineConfig,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                source,
                pacer: RequestPacer::new(config.fetch.request_interval),
                store,
                cache,
                config,
                running: AtomicBool::new(false),
                idle,
                status: RwLock::new(JobStatus::default()),
            }),
        }
    }

    /// Start a run in the background, returning its id once it has been admitted.
    pub fn trigger(&self, trigger: TriggerSource) -> Result<Ulid, ConcurrencyRejected> {
        let guard = self.claim(trigger)?;
        let run_id = guard.run_id;
        let this = self.clone();
        tokio::spawn(async move {
            this.execute(guard).await;
        });
        Ok(run_id)
    }

    /// Run to completion on the calling task.
    pub async fn run_now(&self, trigger: TriggerSource) -> Result<RunSummary, ConcurrencyRejected> {
        let guard = self.claim(trigger)?;
        Ok(self.execute(guard).await)
    }

    /// Snapshot of the job status.
    pub fn status(&self) -> JobStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_next_run(&self, next: Option<DateTime<Utc>>) {
        self.inner.update_status(|s| s.next_run_at = next);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Resolves once no run is in progress.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    fn claim(&self, trigger: TriggerSource) -> Result<RunGuard, ConcurrencyRejected> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let running = self.status().current_run_id;
            return Err(ConcurrencyRejected { running });
        }

        let run_id = Ulid::new();
        self.inner.update_status(|s| {
            s.is_running = true;
            s.current_run_id = Some(run_id);
            s.current_trigger = Some(trigger);
            s.total_runs += 1;
            s.last_run_started_at = Some(Utc::now());
        });
        self.inner.idle.send_replace(false);

        Ok(RunGuard {
            inner: self.inner.clone(),
            run_id,
            trigger,
            started: Instant::now(),
            finished: false,
        })
    }

    async fn execute(&self, guard: RunGuard) -> RunSummary {
        let span = info_span!("ingest_run", run_id = %guard.run_id, trigger = ?guard.trigger);
        async move {
            let config = &self.inner.config;
            info!(periods = config.periods.len(), "Ingestion run started");

            let mut report = RunReport::default();
            let mut failure = None;
            for period in &config.periods {
                match self.ingest_period(period, &mut report).await {
                    Ok(()) => report.periods_completed += 1,
                    Err(e) => {
                        error!(error = %e, "Ingestion run aborted");
                        failure = Some(e);
                        break;
                    }
                }
            }

            // Once any row is written the cached aggregates are stale, whatever the outcome.
            if failure.is_none() || report.rows_written > 0 {
                let invalidation = self.inner.cache.invalidate_plan(&config.invalidation).await;
                report.cache_keys_invalidated = invalidation.deleted;
                if !invalidation.failures.is_empty() {
                    warn!(
                        failures = ?invalidation.failures,
                        "Cache invalidation incomplete; affected keys expire by TTL"
                    );
                }
            }

            let outcome = if failure.is_some() {
                RunOutcome::Failed
            } else {
                RunOutcome::Succeeded
            };
            let error = failure.map(|e| e.to_string());
            guard.finish(outcome, error, report)
        }
        .instrument(span)
        .await
    }

    #[instrument(skip_all, fields(period = %period))]
    async fn ingest_period(
        &self,
        period: &ReportingPeriod,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let config = &self.inner.config;
        let start = Instant::now();

        let records = fetch_period(
            self.inner.source.as_ref(),
            period,
            &config.scope,
            config.fetch,
            &self.inner.pacer,
        )
        .await
        .map_err(|source| RunError::Fetch {
            period: period.to_string(),
            source,
        })?;
        let fetched = records.len();

        let reconciled = reconcile(records);
        let summary = write_batch(self.inner.store.as_ref(), &reconciled.records, &config.rows).await;

        report.records_fetched += fetched;
        report.duplicates_dropped += reconciled.duplicates_dropped;
        report.rows_written += summary.written;
        report.rows_failed += summary.failed;
        report.fields_defaulted += summary.defaulted_fields;

        info!(
            records = fetched,
            duplicates = reconciled.duplicates_dropped,
            written = summary.written,
            failed = summary.failed,
            defaulted_fields = summary.defaulted_fields,
            duration = fmt_duration(start.elapsed()),
            "Period ingested"
        );
        Ok(())
    }
}

/// Ownership of the single run slot. Dropping it without [`RunGuard::finish`]
/// (a panic or a cancelled task) records the run as failed.
struct RunGuard {
    inner: Arc<Inner>,
    run_id: Ulid,
    trigger: TriggerSource,
    started: Instant,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, outcome: RunOutcome, error: Option<String>, report: RunReport) -> RunSummary {
        self.record(outcome, error.clone(), Some(report.clone()));
        self.finished = true;

        let duration = self.started.elapsed();
        match outcome {
            RunOutcome::Succeeded => info!(
                duration = fmt_duration(duration),
                rows_written = report.rows_written,
                rows_failed = report.rows_failed,
                cache_keys_invalidated = report.cache_keys_invalidated,
                "Ingestion run succeeded"
            ),
            RunOutcome::Failed => warn!(
                duration = fmt_duration(duration),
                rows_written = report.rows_written,
                "Ingestion run failed"
            ),
        }

        RunSummary {
            run_id: self.run_id,
            outcome,
            report,
            error,
        }
    }

    fn record(&self, outcome: RunOutcome, error: Option<String>, report: Option<RunReport>) {
        let duration = self.started.elapsed();
        self.inner.update_status(|s| {
            s.last_run_finished_at = Some(Utc::now());
            s.last_run_status = Some(outcome);
            s.last_duration_ms = Some(duration.as_millis() as u64);
            s.last_error = error;
            s.last_report = report;
            if outcome == RunOutcome::Failed {
                s.failed_runs += 1;
            }
        });
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            error!(run_id = %self.run_id, "Ingestion run ended without completing");
            self.record(RunOutcome::Failed, Some("run aborted".to_string()), None);
        }
        self.inner.update_status(|s| {
            s.is_running = false;
            s.current_run_id = None;
            s.current_trigger = None;
        });
        self.inner.running.store(false, Ordering::Release);
        self.inner.idle.send_replace(true);
    }
}
