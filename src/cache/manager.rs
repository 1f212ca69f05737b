//! Cache manager.

use super::backend::{EntryMeta, InsertOutcome, MemoryCache, StoreLookup};
use super::key::{hash_bytes, CacheKey};
use crate::utils::{duration, SweepTask};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: usize,
    #[serde(with = "duration")]
    pub ttl: Duration,
    #[serde(with = "duration")]
    pub cleanup_interval: Duration,
    /// Values larger than this are not cached.
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(600),
            max_entry_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let invalid = |field: &str, msg: &str| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("cache.{}", field))
                    .with_source("cache_config"),
            ))
        };
        if self.max_size == 0 {
            return invalid("max_size", "invalid cache max size");
        }
        if self.ttl.is_zero() {
            return invalid("ttl", "invalid cache ttl");
        }
        if self.cleanup_interval.is_zero() {
            return invalid("cleanup_interval", "invalid cache cleanup interval");
        }
        Ok(())
    }
}

/// Point-in-time cache statistics.
///
/// `hit_ratio` is `0.0` until the first hit or miss is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
    pub hit_ratio: f64,
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(String),
    Miss,
    Expired,
    AuxiliaryMismatch,
    Disabled,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            CacheLookup::Hit(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<String> {
        match self {
            CacheLookup::Hit(v) => Ok(v),
            CacheLookup::Miss | CacheLookup::Expired => Err(Error::CacheMiss),
            CacheLookup::AuxiliaryMismatch => Err(Error::AuxiliaryMismatch),
            CacheLookup::Disabled => Err(Error::CacheDisabled),
        }
    }
}

struct Shared {
    config: CacheConfig,
    store: MemoryCache,
    stats: AtomicStats,
}

impl Shared {
    fn purge_expired(&self) -> usize {
        let removed = self.store.purge_expired(Instant::now());
        if removed > 0 {
            let total = self
                .stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed)
                + removed as u64;
            tracing::info!(
                count = removed,
                total_evictions = total,
                remaining_size = self.store.len(),
                "cleaned up expired cache entries"
            );
        }
        removed
    }
}

/// Response cache with TTL expiry, access-weighted LRU eviction under a size
/// cap, and a background expiry sweep.
///
/// Construct one per process and share it by reference or `Arc`.
pub struct CacheManager {
    inner: Arc<Shared>,
    sweeper: Mutex<Option<SweepTask>>,
}

impl CacheManager {
    /// Validate `config` and start the expiry sweep on the current Tokio
    /// runtime. A disabled cache starts no task.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new(Shared {
            store: MemoryCache::new(config.max_size),
            stats: AtomicStats::new(),
            config,
        });

        let sweeper = if inner.config.enabled {
            let shared = Arc::clone(&inner);
            let task = SweepTask::spawn("cache_sweep", inner.config.cleanup_interval, move || {
                shared.purge_expired();
            })?;
            tracing::info!(
                max_size = inner.config.max_size,
                ttl_secs = inner.config.ttl.as_secs(),
                cleanup_interval_secs = inner.config.cleanup_interval.as_secs(),
                "cache manager initialized"
            );
            Some(task)
        } else {
            tracing::info!("cache disabled");
            None
        };

        Ok(Self {
            inner,
            sweeper: Mutex::new(sweeper),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Look up `key`. When `auxiliary` is non-empty it must hash to the same
    /// value the entry was stored with.
    pub fn lookup(&self, key: &CacheKey, auxiliary: Option<&[u8]>) -> CacheLookup {
        if !self.inner.config.enabled {
            return CacheLookup::Disabled;
        }
        let aux_hash = auxiliary.filter(|a| !a.is_empty()).map(hash_bytes);
        let stats = &self.inner.stats;

        match self
            .inner
            .store
            .lookup(key.as_str(), aux_hash.as_deref(), Instant::now())
        {
            StoreLookup::Hit(value) => {
                stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache hit");
                CacheLookup::Hit(value)
            }
            StoreLookup::Absent => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache miss");
                CacheLookup::Miss
            }
            StoreLookup::Expired => {
                stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache entry expired");
                CacheLookup::Expired
            }
            StoreLookup::AuxiliaryMismatch => {
                stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "cache miss: auxiliary payload changed");
                CacheLookup::AuxiliaryMismatch
            }
        }
    }

    pub fn get(&self, key: &CacheKey, auxiliary: Option<&[u8]>) -> Option<String> {
        self.lookup(key, auxiliary).into_value()
    }

    /// Store `value` under `key` for the configured TTL.
    ///
    /// Fails with [`Error::CacheFull`] only when neither the expiry purge nor
    /// one LRU eviction freed a slot. The write is not retried; callers should
    /// log and carry on uncached.
    pub fn set(
        &self,
        key: &CacheKey,
        auxiliary: Option<&[u8]>,
        value: impl Into<String>,
    ) -> Result<()> {
        if !self.inner.config.enabled {
            return Ok(());
        }
        let value = value.into();
        if value.len() > self.inner.config.max_entry_bytes {
            tracing::debug!(
                key = %key,
                bytes = value.len(),
                limit = self.inner.config.max_entry_bytes,
                "value too large to cache"
            );
            return Ok(());
        }

        let aux_hash = auxiliary.filter(|a| !a.is_empty()).map(hash_bytes);
        let stats = &self.inner.stats;
        match self.inner.store.insert(
            key.as_str(),
            value,
            aux_hash,
            self.inner.config.ttl,
            Instant::now(),
        ) {
            InsertOutcome::Inserted {
                expired,
                lru_evicted,
            } => {
                let evicted = expired as u64 + u64::from(lru_evicted.is_some());
                if evicted > 0 {
                    stats.evictions.fetch_add(evicted, Ordering::Relaxed);
                    tracing::info!(
                        expired,
                        lru_evicted = lru_evicted.as_deref().unwrap_or(""),
                        "cache cleanup on write"
                    );
                }
                tracing::debug!(key = %key, "cache entry stored");
                Ok(())
            }
            InsertOutcome::Replaced => {
                tracing::debug!(key = %key, "cache entry replaced");
                Ok(())
            }
            InsertOutcome::Full { size } => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(size, max_size = self.inner.config.max_size, "cache is full");
                Err(Error::CacheFull {
                    size,
                    max_size: self.inner.config.max_size,
                })
            }
        }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.store.remove(key.as_str())
    }

    /// Run one expiry sweep now. Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    pub fn clear(&self) {
        self.inner.store.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Access bookkeeping for one entry, if present.
    pub fn entry_meta(&self, key: &CacheKey) -> Option<EntryMeta> {
        self.inner.store.entry_meta(key.as_str())
    }

    pub fn stats(&self) -> CacheStats {
        let s = &self.inner.stats;
        let hits = s.hits.load(Ordering::Relaxed);
        let misses = s.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.inner.store.len(),
            max_size: self.inner.config.max_size,
            hits,
            misses,
            evictions: s.evictions.load(Ordering::Relaxed),
            errors: s.errors.load(Ordering::Relaxed),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Stop the sweep task and drop every entry. Safe to call more than once.
    pub async fn close(&self) {
        let task = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let was_running = task.is_some();
        if let Some(task) = task {
            task.stop().await;
        }

        let cleared = self.inner.store.clear();
        if !was_running {
            return;
        }
        let stats = self.stats();
        tracing::info!(
            cleared,
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            "cache manager closed"
        );
    }
}
