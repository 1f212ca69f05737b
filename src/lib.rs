//! # ai-gate
//!
//! 生成式后端的治理核心：响应缓存、限流、请求去重与有界工作队列。
//!
//! Governance core for a rate-limited, cost-per-call generation backend.
//!
//! ## Overview
//!
//! Every incoming request passes through admission control (dedup guard,
//! then the route's token bucket). Admitted requests look up the response
//! cache by a content fingerprint; misses are handed to a bounded work queue
//! drained by the caller's worker pool, and the answer is stored back into
//! the cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_gate::{CacheKeyGenerator, GovernanceConfig, Governor};
//!
//! #[tokio::main]
//! async fn main() -> ai_gate::Result<()> {
//!     let gov: Governor<String, String> = Governor::new(GovernanceConfig::from_env()?)?;
//!
//!     let body = br#"{"prompt":"a soup with leeks"}"#;
//!     gov.admit("POST", "/api/recipes", body)?;
//!
//!     let key = CacheKeyGenerator::new().generate("a soup with leeks", None);
//!     if let Some(answer) = gov.cache().get(&key, None) {
//!         println!("{answer}");
//!     } else {
//!         let handle = gov.queue().enqueue("a soup with leeks".to_string())?;
//!         // ... a worker drains the queue and completes the item ...
//!         let answer = handle.wait().await?;
//!         gov.cache().set(&key, None, answer)?;
//!     }
//!
//!     gov.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Cache keys and the TTL + LFU/LRU response cache |
//! | [`resilience`] | Token-bucket rate limiting, per route |
//! | [`dedup`] | Short-window duplicate request guard |
//! | [`queue`] | Bounded work queue with result channels |
//! | [`governor`] | Owns all components; admission flow and health signals |
//! | [`config`] | YAML and environment configuration |
//! | [`error_code`] | Machine-readable error codes |

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error_code;
pub mod governor;
pub mod queue;
pub mod resilience;
pub mod utils;

pub use cache::{CacheKey, CacheKeyGenerator, CacheManager, CacheStats};
pub use config::GovernanceConfig;
pub use dedup::DedupGuard;
pub use governor::{GovernanceSignals, Governor};
pub use queue::{QueueItem, ResultHandle, WorkQueue};
pub use resilience::rate_limiter::{RateLimiter, RouteLimiters};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
