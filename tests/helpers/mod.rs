#![allow(dead_code)]

use async_trait::async_trait;
use rozgar::cache::keys::InvalidationPlan;
use rozgar::cache::{CacheLayer, CacheTtls, MemoryBackend};
use rozgar::data::facts::{FactRow, FactStore, WriteError};
use rozgar::ingest::fetch::{FetchOptions, PageRequest, PageSource};
use rozgar::ingest::writer::RowContext;
use rozgar::ingest::{Orchestrator, PipelineConfig};
use rozgar::ogd::{FetchError, RawRecord, RegionScope};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};

/// A record shaped like an OGD response row.
pub fn make_record(district_code: &str, fin_year: &str, month: &str, total_exp: &str) -> RawRecord {
    serde_json::from_value(serde_json::json!({
        "state_code": "12",
        "state_name": "HARYANA",
        "district_code": district_code,
        "district_name": format!("District {district_code}"),
        "fin_year": fin_year,
        "month": month,
        "Total_Households_Worked": "1500",
        "Persondays_of_Central_Liability_so_far": "42000.5",
        "Average_Wage_rate_per_day_per_person": "374.2",
        "Total_Exp": total_exp,
    }))
    .unwrap()
}

/// Fact store backed by a map keyed like the real unique constraint.
#[derive(Default)]
pub struct MemoryFactStore {
    rows: Mutex<HashMap<(String, String, i16), FactRow>>,
}

impl MemoryFactStore {
    pub fn get(&self, district_code: &str, fin_year: &str, month: i16) -> Option<FactRow> {
        self.rows
            .lock()
            .unwrap()
            .get(&(district_code.to_string(), fin_year.to_string(), month))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn upsert(&self, row: &FactRow) -> Result<(), WriteError> {
        let key = (row.district_code.clone(), row.fin_year.clone(), row.month);
        self.rows.lock().unwrap().insert(key, row.clone());
        Ok(())
    }
}

/// Serves a fixed record list by offset and limit for every period.
#[derive(Default)]
pub struct ScriptedSource {
    records: Vec<RawRecord>,
    failing_years: HashSet<String>,
    /// When set, every request waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
    panic_once: AtomicBool,
    pub started: Notify,
    requests: Mutex<Vec<(String, u32)>>,
    request_times: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn failing_for(mut self, fiscal_year: &str) -> Self {
        self.failing_years.insert(fiscal_year.to_string());
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn panicking_once(self) -> Self {
        self.panic_once.store(true, Ordering::SeqCst);
        self
    }

    /// `(period, offset)` of every request, in order.
    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().unwrap().clone()
    }

    /// When each request arrived, in order.
    pub fn request_times(&self) -> Vec<Instant> {
        self.request_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<RawRecord>, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.period.to_string(), request.offset));
        self.request_times.lock().unwrap().push(Instant::now());
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("source exploded");
        }
        if self
            .failing_years
            .contains(request.period.fiscal_year.as_str())
        {
            return Err(FetchError::Status {
                offset: request.offset,
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let start = (request.offset as usize).min(self.records.len());
        let end = (start + request.limit as usize).min(self.records.len());
        Ok(self.records[start..end].to_vec())
    }
}

pub fn pipeline(periods: &[&str]) -> PipelineConfig {
    PipelineConfig {
        periods: periods.iter().map(|p| p.parse().unwrap()).collect(),
        scope: RegionScope {
            state_name: "HARYANA".to_string(),
        },
        fetch: FetchOptions {
            page_size: 100,
            request_interval: Duration::ZERO,
            max_pages: 20,
        },
        rows: RowContext {
            default_state_code: "12".to_string(),
            source_url: "https://api.data.gov.in/resource/test".to_string(),
        },
        invalidation: InvalidationPlan::after_ingestion("HARYANA"),
    }
}

pub fn memory_cache() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryBackend::new()), CacheTtls::default())
}

pub fn orchestrator(
    source: Arc<ScriptedSource>,
    store: Arc<MemoryFactStore>,
    periods: &[&str],
) -> Orchestrator {
    Orchestrator::new(source, store, memory_cache(), pipeline(periods))
}
