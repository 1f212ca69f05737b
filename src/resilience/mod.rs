//! 弹性模式模块：令牌桶限流器，按路由独立限流。
//!
//! # Resilience Primitives Module
//!
//! Admission throttling in front of the generation backend.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter::RateLimiter`] | Token bucket with continuous whole-token refill |
//! | [`rate_limiter::RouteLimiters`] | One limiter per protected route |
//!
//! ## Rate Limiter
//!
//! The limiter never blocks. A denied caller gets `false` (or
//! [`Error::RateLimited`](crate::Error::RateLimited) with a retry hint) and
//! applies its own backoff.
//!
//! ```rust
//! use ai_gate::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use std::time::Duration;
//!
//! let config = RateLimiterConfig::from_window(5, Duration::from_secs(1)).unwrap();
//! let limiter = RateLimiter::new(config);
//!
//! for _ in 0..5 {
//!     assert!(limiter.allow());
//! }
//! assert!(!limiter.allow());
//! ```

pub mod rate_limiter;
