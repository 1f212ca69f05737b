//! Process-wide governance instance.
//!
//! Owns the response cache, per-route rate limiters, dedup guard and work
//! queue built from one [`GovernanceConfig`], and runs the admission flow
//! in front of the generation backend.

use crate::cache::{CacheManager, CacheStats};
use crate::config::GovernanceConfig;
use crate::dedup::{DedupGuard, DedupStats};
use crate::queue::{QueueStatus, WorkQueue};
use crate::resilience::rate_limiter::{RateLimiterSnapshot, RouteLimiters};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Point-in-time view of every component, for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceSignals {
    pub cache: CacheStats,
    pub dedup: DedupStats,
    pub queue: QueueStatus,
    pub rate_limiters: BTreeMap<String, RateLimiterSnapshot>,
}

/// Governance components for a generation backend whose calls carry
/// payload `P` and produce `R`.
pub struct Governor<P, R> {
    config: GovernanceConfig,
    cache: CacheManager,
    limiters: RouteLimiters,
    dedup: DedupGuard,
    queue: WorkQueue<P, R>,
}

impl<P, R> Governor<P, R> {
    /// Validate `config` and build every component. Must be called inside a
    /// Tokio runtime; the cache and dedup sweeps are spawned on it.
    pub fn new(config: GovernanceConfig) -> Result<Self> {
        config.validate()?;
        let cache = CacheManager::new(config.cache.clone())?;
        let dedup = DedupGuard::new(config.dedup.clone())?;
        let limiters = RouteLimiters::new(config.rate_limit.clone());
        let queue = WorkQueue::new(config.queue.clone());

        tracing::info!(
            cache_enabled = config.cache.enabled,
            cache_max_size = config.cache.max_size,
            rate_limit_enabled = config.rate_limit.enabled,
            rate_limit_requests = config.rate_limit.requests,
            dedup_enabled = config.dedup.enabled,
            queue_max_size = config.queue.max_size,
            queue_workers = config.queue.workers,
            "governor initialized"
        );

        Ok(Self {
            config,
            cache,
            limiters,
            dedup,
            queue,
        })
    }

    /// Admission control for one incoming request: the dedup guard first,
    /// then the route's rate limiter.
    ///
    /// A duplicate is turned away before it spends a rate-limit token.
    pub fn admit(&self, method: &str, path: &str, body: &[u8]) -> Result<()> {
        self.dedup.check_request(method, path, body)?;
        if let Err(e) = self.limiters.check(path) {
            tracing::warn!(method, path, error = %e, "request rate limited");
            return Err(e);
        }
        Ok(())
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn limiters(&self) -> &RouteLimiters {
        &self.limiters
    }

    pub fn dedup(&self) -> &DedupGuard {
        &self.dedup
    }

    pub fn queue(&self) -> &WorkQueue<P, R> {
        &self.queue
    }

    pub fn signals(&self) -> GovernanceSignals {
        GovernanceSignals {
            cache: self.cache.stats(),
            dedup: self.dedup.stats(),
            queue: self.queue.status(),
            rate_limiters: self.limiters.snapshots().into_iter().collect(),
        }
    }

    /// Close the queue, then stop the cache and dedup sweeps. Items already
    /// queued stay drainable. Safe to call more than once.
    pub async fn close(&self) {
        self.queue.close();
        self.cache.close().await;
        self.dedup.close().await;
        tracing::info!("governor closed");
    }
}
