//! Short-window duplicate submission guard.

use crate::cache::hash_bytes;
use crate::utils::{duration, SweepTask};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Records older than this many windows are purged by the sweep.
pub const RETENTION_WINDOWS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    #[serde(with = "duration")]
    pub window: Duration,
    #[serde(with = "duration")]
    pub sweep_interval: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(600),
        }
    }
}

impl DedupConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let field = if self.window.is_zero() {
            "window"
        } else if self.sweep_interval.is_zero() {
            "sweep_interval"
        } else {
            return Ok(());
        };
        Err(Error::configuration_with_context(
            format!("invalid dedup {}", field),
            ErrorContext::new()
                .with_field_path(format!("dedup.{}", field))
                .with_source("dedup_config"),
        ))
    }

    /// Age after which a record no longer matters. Saturates at `Duration::MAX`.
    pub fn retention(&self) -> Duration {
        self.window.saturating_mul(RETENTION_WINDOWS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub tracked: usize,
    pub duplicates: u64,
    pub purged: u64,
}

/// Verbs that change state. Everything else bypasses the guard.
pub fn is_state_changing(method: &str) -> bool {
    ["POST", "PUT", "PATCH", "DELETE"]
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// `METHOD:path[:body_hash]`
pub fn fingerprint(method: &str, path: &str, body_hash: Option<&str>) -> String {
    let method = method.to_ascii_uppercase();
    match body_hash.filter(|h| !h.is_empty()) {
        Some(h) => format!("{}:{}:{}", method, path, h),
        None => format!("{}:{}", method, path),
    }
}

struct Shared {
    config: DedupConfig,
    records: RwLock<HashMap<String, Instant>>,
    duplicates: AtomicU64,
    purged: AtomicU64,
}

impl Shared {
    fn purge_stale(&self, now: Instant) -> usize {
        let retention = self.config.retention();
        let removed = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let before = records.len();
            records.retain(|_, seen| now.saturating_duration_since(*seen) <= retention);
            before - records.len()
        };
        if removed > 0 {
            self.purged.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(count = removed, "purged stale dedup records");
        }
        removed
    }

    /// `Some(remaining)` when `fp` was seen within the window.
    fn recent(&self, records: &HashMap<String, Instant>, fp: &str, now: Instant) -> Option<Duration> {
        let seen = records.get(fp)?;
        let age = now.saturating_duration_since(*seen);
        if age <= self.config.window {
            Some(self.config.window - age)
        } else {
            None
        }
    }
}

/// Rejects identical state-changing requests submitted within a short
/// window of each other.
pub struct DedupGuard {
    inner: Arc<Shared>,
    sweeper: Mutex<Option<SweepTask>>,
}

impl DedupGuard {
    /// Validate `config` and start the stale-record sweep on the current Tokio
    /// runtime.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new(Shared {
            config,
            records: RwLock::new(HashMap::new()),
            duplicates: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        });

        let sweeper = if inner.config.enabled {
            let shared = Arc::clone(&inner);
            Some(SweepTask::spawn(
                "dedup_sweep",
                inner.config.sweep_interval,
                move || {
                    shared.purge_stale(Instant::now());
                },
            )?)
        } else {
            None
        };

        Ok(Self {
            inner,
            sweeper: Mutex::new(sweeper),
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.inner.config
    }

    fn check_fingerprint(&self, fp: String) -> Option<Duration> {
        if !self.inner.config.enabled {
            return None;
        }
        let now = Instant::now();
        {
            let records = self.inner.records.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(remaining) = self.inner.recent(&records, &fp, now) {
                self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
                return Some(remaining);
            }
        }

        let mut records = self.inner.records.write().unwrap_or_else(PoisonError::into_inner);
        // Another submission may have landed between the two locks.
        if let Some(remaining) = self.inner.recent(&records, &fp, now) {
            self.inner.duplicates.fetch_add(1, Ordering::Relaxed);
            return Some(remaining);
        }
        records.insert(fp, now);
        None
    }

    /// Returns `true` when the same `(method, path, body_hash)` was recorded
    /// within the window; the existing record is left untouched. Otherwise
    /// records the fingerprint and returns `false`.
    pub fn check_and_record(&self, method: &str, path: &str, body_hash: Option<&str>) -> bool {
        self.check_fingerprint(fingerprint(method, path, body_hash))
            .is_some()
    }

    /// Request-level check: read-only verbs bypass the guard, an empty body
    /// contributes no hash, and a duplicate yields [`Error::Duplicate`] with
    /// the time left in the window.
    pub fn check_request(&self, method: &str, path: &str, body: &[u8]) -> Result<()> {
        if !is_state_changing(method) {
            return Ok(());
        }
        let body_hash = (!body.is_empty()).then(|| hash_bytes(body));
        match self.check_fingerprint(fingerprint(method, path, body_hash.as_deref())) {
            None => Ok(()),
            Some(retry_after) => {
                tracing::info!(
                    method,
                    path,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "duplicate request rejected"
                );
                Err(Error::Duplicate { retry_after })
            }
        }
    }

    /// Drop records older than the retention period. Returns the number removed.
    pub fn purge_stale(&self) -> usize {
        self.inner.purge_stale(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            tracked: self.len(),
            duplicates: self.inner.duplicates.load(Ordering::Relaxed),
            purged: self.inner.purged.load(Ordering::Relaxed),
        }
    }

    /// Stop the sweep task and forget all records. Safe to call more than once.
    pub async fn close(&self) {
        let task = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop().await;
        }
        self.inner
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(window_ms: u64) -> DedupGuard {
        DedupGuard::new(DedupConfig::new().with_window(Duration::from_millis(window_ms))).unwrap()
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(fingerprint("post", "/api/ai", Some("abc")), "POST:/api/ai:abc");
        assert_eq!(fingerprint("POST", "/api/ai", None), "POST:/api/ai");
        assert_eq!(fingerprint("POST", "/api/ai", Some("")), "POST:/api/ai");
    }

    #[test]
    fn test_state_changing_verbs() {
        assert!(is_state_changing("POST"));
        assert!(is_state_changing("put"));
        assert!(is_state_changing("PATCH"));
        assert!(is_state_changing("DELETE"));
        assert!(!is_state_changing("GET"));
        assert!(!is_state_changing("HEAD"));
        assert!(!is_state_changing("OPTIONS"));
    }

    #[test]
    fn test_config_validation() {
        assert!(DedupConfig::default().validate().is_ok());
        assert!(DedupConfig::new().with_window(Duration::ZERO).validate().is_err());
        assert!(DedupConfig::new()
            .with_sweep_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert_eq!(DedupConfig::default().retention(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_duplicate_within_window() {
        let guard = guard(200);
        assert!(!guard.check_and_record("POST", "/api/recipes", Some("h1")));
        assert!(guard.check_and_record("POST", "/api/recipes", Some("h1")));
        // Different body is a different request.
        assert!(!guard.check_and_record("POST", "/api/recipes", Some("h2")));
        assert_eq!(guard.stats().duplicates, 1);
        guard.close().await;
    }

    #[tokio::test]
    async fn test_window_elapses() {
        let guard = guard(30);
        assert!(!guard.check_and_record("POST", "/api/recipes", Some("h1")));
        assert!(guard.check_and_record("POST", "/api/recipes", Some("h1")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!guard.check_and_record("POST", "/api/recipes", Some("h1")));
        guard.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_does_not_refresh_record() {
        let guard = guard(60);
        assert!(!guard.check_and_record("POST", "/p", None));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(guard.check_and_record("POST", "/p", None));
        tokio::time::sleep(Duration::from_millis(40)).await;
        // 80ms after the first record; the duplicate at 40ms did not extend it.
        assert!(!guard.check_and_record("POST", "/p", None));
        guard.close().await;
    }

    #[tokio::test]
    async fn test_check_request_bypasses_reads() {
        let guard = guard(500);
        for _ in 0..3 {
            assert!(guard.check_request("GET", "/api/recipes", b"").is_ok());
        }
        assert!(guard.is_empty());

        assert!(guard.check_request("POST", "/api/recipes", b"{\"q\":1}").is_ok());
        let err = guard
            .check_request("POST", "/api/recipes", b"{\"q\":1}")
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert!(err.retry_after().unwrap() <= Duration::from_millis(500));
        guard.close().await;
    }

    #[tokio::test]
    async fn test_purge_stale() {
        let guard = guard(5);
        guard.check_and_record("POST", "/a", None);
        guard.check_and_record("POST", "/b", None);
        assert_eq!(guard.purge_stale(), 0);

        tokio::time::sleep(Duration::from_millis(70)).await;
        guard.check_and_record("POST", "/c", None);
        assert_eq!(guard.purge_stale(), 2);
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.stats().purged, 2);
        guard.close().await;
    }

    #[tokio::test]
    async fn test_huge_window_saturates_retention() {
        let window = Duration::from_secs(u64::MAX / 5);
        let config = DedupConfig::new().with_window(window);
        assert!(config.validate().is_ok());
        assert_eq!(config.retention(), Duration::MAX);

        let guard = DedupGuard::new(config).unwrap();
        assert!(!guard.check_and_record("POST", "/a", None));
        assert_eq!(guard.purge_stale(), 0);
        assert!(guard.check_and_record("POST", "/a", None));
        assert_eq!(guard.len(), 1);
        guard.close().await;
    }

    #[tokio::test]
    async fn test_background_sweep_purges() {
        let guard = DedupGuard::new(
            DedupConfig::new()
                .with_window(Duration::from_millis(2))
                .with_sweep_interval(Duration::from_millis(25)),
        )
        .unwrap();
        guard.check_and_record("POST", "/a", None);
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(guard.is_empty());
        guard.close().await;
    }

    #[tokio::test]
    async fn test_disabled_guard() {
        let guard = DedupGuard::new(DedupConfig::new().with_enabled(false)).unwrap();
        assert!(!guard.check_and_record("POST", "/a", None));
        assert!(!guard.check_and_record("POST", "/a", None));
        guard.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_submissions_admit_exactly_one() {
        let guard = Arc::new(guard(1000));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let g = Arc::clone(&guard);
            handles.push(std::thread::spawn(move || {
                g.check_and_record("POST", "/api/ai", Some("same"))
            }));
        }
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|dup| !dup)
            .count();
        assert_eq!(admitted, 1);
        guard.close().await;
    }
}
