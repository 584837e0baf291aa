//! Timer that fires scheduled ingestion runs.

use crate::ingest::orchestrator::Orchestrator;
use crate::ingest::schedule::CalendarSchedule;
use crate::ingest::status::TriggerSource;
use crate::utils::fmt_duration;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Fires scheduled ingestion runs on a calendar expression.
pub struct Scheduler {
    orchestrator: Orchestrator,
    schedule: CalendarSchedule,
    timezone: Tz,
    /// How long an in-flight run may continue after shutdown is requested.
    grace: Duration,
}

impl Scheduler {
    pub fn new(
        orchestrator: Orchestrator,
        schedule: CalendarSchedule,
        timezone: Tz,
        grace: Duration,
    ) -> Self {
        Self {
            orchestrator,
            schedule,
            timezone,
            grace,
        }
    }

    /// Runs until a shutdown signal arrives.
    ///
    /// Each firing spawns a run, so the timer keeps ticking while ingestion
    /// works; a firing that overlaps a run is skipped with a warning. On
    /// shutdown the timer stops first, then any in-flight run is given
    /// `grace` to finish before it is abandoned.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            schedule = %self.schedule,
            timezone = %self.timezone,
            "Ingestion scheduler started"
        );

        let mut last_fired: Option<DateTime<Tz>> = None;
        loop {
            let now = Utc::now().with_timezone(&self.timezone);
            // The timer may wake a hair before the wall clock reaches the slot.
            let from = match &last_fired {
                Some(fired) if *fired > now => *fired,
                _ => now,
            };
            let Some(next) = self.schedule.next_after(&from) else {
                error!(schedule = %self.schedule, "Schedule never fires; scheduler idle until shutdown");
                self.orchestrator.set_next_run(None);
                let _ = shutdown_rx.recv().await;
                break;
            };

            let next_utc = next.with_timezone(&Utc);
            self.orchestrator.set_next_run(Some(next_utc));
            let wait = (next_utc - Utc::now()).to_std().unwrap_or_default();
            debug!(next_run = %next, wait = fmt_duration(wait), "Next ingestion scheduled");

            tokio::select! {
                _ = time::sleep(wait) => {
                    last_fired = Some(next);
                    let orchestrator = self.orchestrator.clone();
                    tokio::spawn(async move {
                        if let Err(rejected) = orchestrator.run_now(TriggerSource::Scheduled).await {
                            warn!(running = ?rejected.running, "Scheduled run skipped, previous run still in progress");
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Ingestion scheduler received shutdown signal");
                    break;
                }
            }
        }

        self.orchestrator.set_next_run(None);
        if self.orchestrator.is_running() {
            info!(grace = fmt_duration(self.grace), "Waiting for in-flight ingestion run");
            if time::timeout(self.grace, self.orchestrator.wait_idle())
                .await
                .is_err()
            {
                warn!(
                    grace = fmt_duration(self.grace),
                    "Ingestion run did not finish in time, abandoning"
                );
            } else {
                debug!("In-flight ingestion run finished");
            }
        }
        info!("Ingestion scheduler exited");
    }
}
