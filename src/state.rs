//! Application state shared across the web and scheduler services.

use crate::cache::CacheLayer;
use crate::ingest::Orchestrator;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

/// Health status of a service.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Active,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status)
    }

    /// Snapshot of all services with seconds since their last status change.
    pub fn all(&self) -> Vec<(String, ServiceStatus, u64)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.status,
                    entry.updated_at.elapsed().as_secs(),
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub orchestrator: Orchestrator,
    pub cache: CacheLayer,
    pub service_statuses: ServiceStatusRegistry,
    /// Shared secret for the admin routes; `None` disables them.
    pub admin_api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db_pool: PgPool, orchestrator: Orchestrator, admin_api_key: Option<String>) -> Self {
        Self {
            cache: orchestrator.cache().clone(),
            db_pool,
            orchestrator,
            service_statuses: ServiceStatusRegistry::new(),
            admin_api_key: admin_api_key.map(Arc::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_overwrites_status() {
        let registry = ServiceStatusRegistry::new();
        registry.set("web", ServiceStatus::Starting);
        registry.set("web", ServiceStatus::Active);
        assert_eq!(registry.get("web"), Some(ServiceStatus::Active));
        assert_eq!(registry.get("scheduler"), None);
        assert_eq!(registry.all().len(), 1);
    }
}
