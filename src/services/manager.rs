use crate::services::Service;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::utils::fmt_duration;

/// How a service task ended.
#[derive(Debug)]
pub enum ServiceExit {
    Completed,
    Failed(anyhow::Error),
    Panicked,
}

/// Owns every service task and the shutdown broadcast they listen on.
pub struct ServiceManager {
    pending: Vec<(&'static str, Box<dyn Service>)>,
    tasks: JoinSet<anyhow::Result<()>>,
    names: HashMap<Id, &'static str>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pending: Vec::new(),
            tasks: JoinSet::new(),
            names: HashMap::new(),
            shutdown_tx,
        }
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        debug!(service = name, "Registered service");
        self.pending.push((name, service));
    }

    pub fn has_services(&self) -> bool {
        !self.pending.is_empty() || !self.tasks.is_empty()
    }

    pub fn spawn_all(&mut self) {
        for (name, mut service) in self.pending.drain(..) {
            let shutdown_rx = self.shutdown_tx.subscribe();
            let handle = self
                .tasks
                .spawn(async move { service.run(shutdown_rx).await });
            self.names.insert(handle.id(), name);
            info!(service = name, "Service started");
        }
    }

    /// Waits for the first service to stop on its own.
    ///
    /// Returns `None` if no services are running.
    pub async fn next_exit(&mut self) -> Option<(&'static str, ServiceExit)> {
        let result = self.tasks.join_next_with_id().await?;
        Some(match result {
            Ok((id, Ok(()))) => (self.name_of(id), ServiceExit::Completed),
            Ok((id, Err(e))) => (self.name_of(id), ServiceExit::Failed(e)),
            Err(join_error) => (self.name_of(join_error.id()), ServiceExit::Panicked),
        })
    }

    fn name_of(&mut self, id: Id) -> &'static str {
        self.names.remove(&id).unwrap_or("unknown")
    }

    /// Signals every service to stop and waits up to `timeout` for them.
    ///
    /// Returns the names of services that did not stop in time; those are aborted.
    pub async fn shutdown(&mut self, timeout: Duration) -> Vec<&'static str> {
        let start = Instant::now();
        let _ = self.shutdown_tx.send(());

        let drain = async {
            while let Some(result) = self.tasks.join_next_with_id().await {
                match result {
                    Ok((id, Ok(()))) => {
                        let name = self.names.remove(&id).unwrap_or("unknown");
                        debug!(service = name, "Service stopped");
                    }
                    Ok((id, Err(e))) => {
                        let name = self.names.remove(&id).unwrap_or("unknown");
                        warn!(service = name, error = ?e, "Service failed during shutdown");
                    }
                    Err(e) => {
                        let name = self.names.remove(&e.id()).unwrap_or("unknown");
                        error!(service = name, "Service panicked during shutdown");
                    }
                }
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            let stuck: Vec<&'static str> = self.names.values().copied().collect();
            warn!(
                services = ?stuck,
                timeout = fmt_duration(timeout),
                "Services did not stop in time, aborting"
            );
            self.tasks.abort_all();
            self.names.clear();
            return stuck;
        }

        info!(elapsed = fmt_duration(start.elapsed()), "All services stopped");
        Vec::new()
    }
}
