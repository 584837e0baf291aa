//! Read-through cache in front of the fact store.
//!
//! The cache is derived and disposable: every failure here degrades to a miss
//! (reads) or a logged warning (writes and invalidation), never to an error the
//! caller has to handle.

pub mod keys;
pub mod memory;

use crate::utils::fmt_duration;
use async_trait::async_trait;
use keys::{InvalidationPlan, InvalidationReport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use memory::MemoryBackend;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to (de)serialize cache entry '{key}'")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage contract for cache entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
    /// Removes every entry, returning how many there were.
    async fn flush(&self) -> Result<usize, CacheError>;
    async fn len(&self) -> Result<usize, CacheError>;

    async fn delete_many(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Districts,
    Schemes,
    Rankings,
    Budget,
    Trends,
    Location,
}

/// Time-to-live per cache category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTtls {
    #[serde(serialize_with = "as_secs")]
    pub districts: Duration,
    #[serde(serialize_with = "as_secs")]
    pub schemes: Duration,
    #[serde(serialize_with = "as_secs")]
    pub rankings: Duration,
    #[serde(serialize_with = "as_secs")]
    pub budget: Duration,
    #[serde(serialize_with = "as_secs")]
    pub trends: Duration,
    #[serde(serialize_with = "as_secs")]
    pub location: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            districts: Duration::from_secs(86_400),
            schemes: Duration::from_secs(86_400),
            rankings: Duration::from_secs(21_600),
            budget: Duration::from_secs(7_200),
            trends: Duration::from_secs(3_600),
            location: Duration::from_secs(43_200),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Districts => self.districts,
            CacheCategory::Schemes => self.schemes,
            CacheCategory::Rankings => self.rankings,
            CacheCategory::Budget => self.budget,
            CacheCategory::Trends => self.trends,
            CacheCategory::Location => self.location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Cache,
    #[serde(rename = "database")]
    Store,
}

/// A value together with where it was read from.
#[derive(Debug, Clone, Serialize)]
pub struct Cached<T> {
    #[serde(flatten)]
    pub value: T,
    pub source: ValueSource,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub ttls: CacheTtls,
}

const SLOW_INVALIDATION: Duration = Duration::from_millis(250);

/// JSON cache with category TTLs over any [`CacheBackend`].
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    ttls: CacheTtls,
    counters: Arc<Counters>,
    /// Bumped before every deletion so in-flight computes can tell they raced one.
    generation: Arc<AtomicU64>,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, ttls: CacheTtls) -> Self {
        Self {
            backend,
            ttls,
            counters: Arc::default(),
            generation: Arc::default(),
        }
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Read and decode `key`. Backend failures and undecodable entries are misses.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = ?e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(source) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                let e = CacheError::Serialization {
                    key: key.to_owned(),
                    source,
                };
                warn!(key, error = ?e, "Dropping undecodable cache entry");
                let _ = self.backend.delete(key).await;
                None
            }
        }
    }

    pub async fn write<T: Serialize>(&self, key: &str, value: &T, category: CacheCategory) {
        self.write_with_ttl(key, value, self.ttls.ttl(category)).await
    }

    pub async fn write_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let result = serde_json::to_string(value)
            .map_err(|source| CacheError::Serialization {
                key: key.to_owned(),
                source,
            });
        let outcome = match result {
            Ok(raw) => self.backend.set(key, raw, ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            warn!(key, error = ?e, "Cache write failed");
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        self.bump_generation();
        self.backend.delete(key).await
    }

    /// Delete every key starting with `prefix`. A trailing `*` is accepted.
    pub async fn invalidate_pattern(&self, prefix: &str) -> Result<usize, CacheError> {
        self.bump_generation();
        let prefix = prefix.strip_suffix('*').unwrap_or(prefix);
        let keys = self.backend.keys_with_prefix(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.backend.delete_many(&keys).await
    }

    pub async fn flush(&self) -> Result<usize, CacheError> {
        self.bump_generation();
        let count = self.backend.flush().await?;
        info!(entries = count, "Cache flushed");
        Ok(count)
    }

    /// Apply `plan`, logging failures instead of returning them.
    pub async fn invalidate_plan(&self, plan: &InvalidationPlan) -> InvalidationReport {
        let start = Instant::now();
        let mut report = InvalidationReport::default();

        for key in &plan.exact {
            match self.invalidate(key).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = ?e, "Failed to invalidate cache key");
                    report.failures.push(key.clone());
                }
            }
        }
        for prefix in &plan.prefixes {
            match self.invalidate_pattern(prefix).await {
                Ok(n) => report.deleted += n,
                Err(e) => {
                    warn!(prefix = %prefix, error = ?e, "Failed to invalidate cache prefix");
                    report.failures.push(format!("{prefix}*"));
                }
            }
        }

        let elapsed = start.elapsed();
        crate::utils::log_if_slow(start, SLOW_INVALIDATION, "cache invalidation");
        debug!(
            deleted = report.deleted,
            failures = report.failures.len(),
            duration = fmt_duration(elapsed),
            "Applied cache invalidation plan"
        );
        report
    }

    /// Cache-aside read: serve `key` from the cache, or compute it, store it, and return it.
    ///
    /// Errors from `compute` are returned untouched and nothing is cached. A value
    /// computed while an invalidation ran may predate it, so it is returned but
    /// not kept.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        category: CacheCategory,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read(key).await {
            return Ok(Cached {
                value,
                source: ValueSource::Cache,
            });
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let value = compute().await?;
        if self.generation.load(Ordering::SeqCst) == generation {
            self.write(key, &value, category).await;
            // An invalidation may have landed between the check and the write.
            if self.generation.load(Ordering::SeqCst) != generation {
                let _ = self.backend.delete(key).await;
            }
        } else {
            debug!(key, "Cache invalidated during compute, not storing result");
        }
        Ok(Cached {
            value,
            source: ValueSource::Store,
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            ttls: self.ttls,
        }
    }

    /// Live entry count, or `None` when the backend cannot say.
    pub async fn entry_count(&self) -> Option<usize> {
        self.backend.len().await.ok()
    }
}
