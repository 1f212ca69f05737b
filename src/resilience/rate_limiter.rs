use crate::utils::duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub enabled: bool,
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub tokens: u32,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

/// `requests` admissions per `window`, refilled continuously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    /// Bucket capacity; also the number of tokens refilled per window.
    pub requests: u32,
    #[serde(with = "duration")]
    pub window: Duration,
}

impl RateLimiterConfig {
    /// `None` when either side of the ratio is zero.
    pub fn from_window(requests: u32, window: Duration) -> Option<Self> {
        if requests == 0 || window.is_zero() {
            return None;
        }
        Some(Self {
            enabled: true,
            requests,
            window,
        })
    }

    pub fn new() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window: Duration::from_secs(60),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Tokens per second.
    pub fn refill_rate(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn secs(v: f64) -> Duration {
    Duration::try_from_secs_f64(v).unwrap_or(Duration::MAX)
}

#[derive(Debug)]
struct State {
    tokens: u32,
    last_refill: Instant,
}

/// Non-blocking token-bucket rate limiter.
///
/// - Starts full
/// - Refills whole tokens only; fractional accrual carries over
/// - Callers that are denied get an immediate answer and a retry hint
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    rate: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let rate = cfg.refill_rate();
        let state = Mutex::new(State {
            tokens: cfg.requests,
            last_refill: Instant::now(),
        });
        Self { cfg, rate, state }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill_locked(&self, st: &mut State, now: Instant) {
        let capacity = self.cfg.requests;
        if st.tokens >= capacity || self.rate <= 0.0 {
            // A full bucket banks no credit for the time it sits idle.
            st.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(st.last_refill).as_secs_f64();
        let added = (elapsed * self.rate).floor();
        if added < 1.0 {
            return;
        }
        let room = capacity - st.tokens;
        if added >= room as f64 {
            st.tokens = capacity;
            st.last_refill = now;
        } else {
            st.tokens += added as u32;
            st.last_refill = st
                .last_refill
                .checked_add(secs(added / self.rate))
                .unwrap_or(now);
        }
    }

    fn wait_locked(&self, st: &State, now: Instant) -> Duration {
        if st.tokens >= 1 || self.rate <= 0.0 {
            return Duration::ZERO;
        }
        match st.last_refill.checked_add(secs(1.0 / self.rate)) {
            Some(next) => next.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }

    /// Consume one token if available.
    pub fn allow(&self) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        let mut st = self.lock();
        self.refill_locked(&mut st, Instant::now());
        if st.tokens >= 1 {
            st.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Like [`allow`](Self::allow) but returns a `RateLimited` error carrying
    /// the time until the next token.
    pub fn check(&self, route: &str) -> Result<()> {
        if !self.cfg.enabled {
            return Ok(());
        }
        let mut st = self.lock();
        let now = Instant::now();
        self.refill_locked(&mut st, now);
        if st.tokens >= 1 {
            st.tokens -= 1;
            return Ok(());
        }
        let retry_after = self.wait_locked(&st, now);
        drop(st);
        tracing::debug!(
            route,
            retry_after_ms = retry_after.as_millis() as u64,
            "rate limit exceeded"
        );
        Err(Error::RateLimited {
            route: route.to_string(),
            retry_after,
        })
    }

    /// Time until the next token is available; zero if one is available now.
    pub fn retry_after(&self) -> Duration {
        if !self.cfg.enabled {
            return Duration::ZERO;
        }
        let mut st = self.lock();
        let now = Instant::now();
        self.refill_locked(&mut st, now);
        self.wait_locked(&st, now)
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut st = self.lock();
        let now = Instant::now();
        self.refill_locked(&mut st, now);
        let wait = self.wait_locked(&st, now);
        RateLimiterSnapshot {
            enabled: self.cfg.enabled,
            capacity: self.cfg.requests,
            refill_per_sec: self.rate,
            tokens: st.tokens,
            estimated_wait_ms: if self.cfg.enabled && st.tokens == 0 {
                Some(wait.as_millis() as u64)
            } else {
                None
            },
        }
    }
}

/// One [`RateLimiter`] per protected route, created on first use from a
/// shared configuration.
pub struct RouteLimiters {
    cfg: RateLimiterConfig,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl RouteLimiters {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            limiters: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    pub fn for_route(&self, route: &str) -> Arc<RateLimiter> {
        if let Some(l) = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route)
        {
            return Arc::clone(l);
        }
        let mut limiters = self
            .limiters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            limiters
                .entry(route.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(self.cfg.clone()))),
        )
    }

    pub fn check(&self, route: &str) -> Result<()> {
        if !self.cfg.enabled {
            return Ok(());
        }
        self.for_route(route).check(route)
    }

    /// Snapshots of every route seen so far, sorted by route.
    pub fn snapshots(&self) -> Vec<(String, RateLimiterSnapshot)> {
        let limiters: Vec<(String, Arc<RateLimiter>)> = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let mut out: Vec<_> = limiters
            .into_iter()
            .map(|(route, l)| (route, l.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_config_from_window() {
        let config = RateLimiterConfig::from_window(5, Duration::from_secs(1)).unwrap();
        assert_eq!(config.requests, 5);
        assert_eq!(config.refill_rate(), 5.0);

        let per_minute = RateLimiterConfig::from_window(100, Duration::from_secs(60)).unwrap();
        assert!((per_minute.refill_rate() - 100.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limiter_config_from_window_invalid() {
        assert!(RateLimiterConfig::from_window(0, Duration::from_secs(1)).is_none());
        assert!(RateLimiterConfig::from_window(5, Duration::ZERO).is_none());
    }

    #[test]
    fn test_rate_limiter_burst_then_deny() {
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(5, Duration::from_secs(1)).unwrap());
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[test]
    fn test_rate_limiter_recovers_after_window() {
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(5, Duration::from_secs(1)).unwrap());
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());

        std::thread::sleep(Duration::from_millis(1100));
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[test]
    fn test_rate_limiter_refill_is_whole_tokens() {
        // 100 tokens/sec = 1 token/10ms
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(5, Duration::from_millis(50)).unwrap());
        for _ in 0..5 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());

        std::thread::sleep(Duration::from_millis(25));
        let snap = limiter.snapshot();
        assert!(snap.tokens >= 1, "tokens = {}", snap.tokens);
        assert!(limiter.allow());
    }

    #[test]
    fn test_frequent_callers_still_refill() {
        // Polling faster than one token interval must not starve the bucket.
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(1, Duration::from_millis(30)).unwrap());
        assert!(limiter.allow());
        let start = Instant::now();
        let mut admitted = false;
        while start.elapsed() < Duration::from_millis(200) {
            if limiter.allow() {
                admitted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(admitted);
    }

    #[test]
    fn test_rate_limiter_check_carries_retry_hint() {
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(1, Duration::from_secs(2)).unwrap());
        assert!(limiter.check("/api/ai").is_ok());

        let err = limiter.check("/api/ai").unwrap_err();
        match err {
            Error::RateLimited { route, retry_after } => {
                assert_eq!(route, "/api/ai");
                assert!(retry_after > Duration::from_millis(1500));
                assert!(retry_after <= Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limiter_disabled_always_allows() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::from_window(1, Duration::from_secs(60))
                .unwrap()
                .with_enabled(false),
        );
        for _ in 0..10 {
            assert!(limiter.allow());
        }
        assert_eq!(limiter.retry_after(), Duration::ZERO);
        assert!(limiter.snapshot().estimated_wait_ms.is_none());
    }

    #[test]
    fn test_rate_limiter_snapshot() {
        let limiter =
            RateLimiter::new(RateLimiterConfig::from_window(2, Duration::from_secs(10)).unwrap());
        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.capacity, 2);
        assert_eq!(snapshot.tokens, 2);
        assert!((snapshot.refill_per_sec - 0.2).abs() < 1e-9);
        assert!(snapshot.estimated_wait_ms.is_none());

        limiter.allow();
        limiter.allow();
        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.tokens, 0);
        assert!(snapshot.estimated_wait_ms.unwrap() > 0);
    }

    #[test]
    fn test_route_limiters_are_independent() {
        let routes =
            RouteLimiters::new(RateLimiterConfig::from_window(1, Duration::from_secs(60)).unwrap());
        assert!(routes.check("/api/recipes").is_ok());
        assert!(routes.check("/api/recipes").is_err());
        assert!(routes.check("/api/ingredients").is_ok());

        assert!(Arc::ptr_eq(
            &routes.for_route("/api/recipes"),
            &routes.for_route("/api/recipes")
        ));

        let snaps = routes.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].0, "/api/ingredients");
        assert_eq!(snaps[1].1.tokens, 0);
    }

    #[test]
    fn test_rate_limiter_thread_safe() {
        let limiter = Arc::new(RateLimiter::new(
            RateLimiterConfig::from_window(50, Duration::from_secs(3600)).unwrap(),
        ));
        let mut handles = vec![];
        for _ in 0..8 {
            let l = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                (0..20).filter(|_| l.allow()).count()
            }));
        }
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_huge_window_reports_saturated_wait() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::from_window(1, Duration::from_secs(u64::MAX)).unwrap(),
        );
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert_eq!(limiter.retry_after(), Duration::MAX);
        let err = limiter.check("/api/recipes").unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::MAX));
        assert!(limiter.snapshot().estimated_wait_ms.is_some());
    }
}
