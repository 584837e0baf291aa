use crate::ingest::scheduler::Scheduler;
use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};
use tokio::sync::broadcast;

/// Runs the ingestion [`Scheduler`] as a managed service.
pub struct SchedulerService {
    scheduler: Scheduler,
    statuses: ServiceStatusRegistry,
}

impl SchedulerService {
    pub fn new(scheduler: Scheduler, statuses: ServiceStatusRegistry) -> Self {
        Self {
            scheduler,
            statuses,
        }
    }
}

#[async_trait::async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        self.statuses.set(self.name(), ServiceStatus::Active);
        self.scheduler.run(shutdown_rx).await;
        self.statuses.set(self.name(), ServiceStatus::Disabled);
        Ok(())
    }
}
