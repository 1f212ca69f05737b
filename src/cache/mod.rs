//! 响应缓存模块：带 TTL 过期与访问加权 LRU 淘汰的并发缓存。
//!
//! # Response Caching Module
//!
//! Caches backend results keyed by a request fingerprint so that repeated
//! prompts never reach the costly generation backend twice within the TTL.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheManager`] | Enable switch, statistics, background expiry sweep |
//! | [`CacheConfig`] | Size cap, TTL, sweep interval |
//! | [`MemoryCache`] | Entry store implementing expiry and eviction |
//! | [`CacheKeyGenerator`] | Fingerprint derivation from prompt + auxiliary payload |
//!
//! ## Example
//!
//! ```rust,no_run
//! use ai_gate::cache::{CacheConfig, CacheKeyGenerator, CacheManager, normalize_prompt};
//! use std::time::Duration;
//!
//! # async fn demo() -> ai_gate::Result<()> {
//! let cache = CacheManager::new(CacheConfig::new().with_ttl(Duration::from_secs(3600)))?;
//! let key = CacheKeyGenerator::new().generate(&normalize_prompt(" two eggs "), None);
//!
//! if cache.get(&key, None).is_none() {
//!     let answer = "scrambled".to_string(); // call the backend here
//!     if let Err(e) = cache.set(&key, None, answer) {
//!         tracing::warn!(error = %e, "continuing without caching");
//!     }
//! }
//! cache.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Eviction
//!
//! A write that arrives while the store is at capacity first purges expired
//! entries, then evicts the entry with the fewest accesses (oldest access on
//! ties), then fails with [`crate::Error::CacheFull`].

mod backend;
mod key;
mod manager;

pub use backend::{EntryMeta, InsertOutcome, MemoryCache, StoreLookup};
pub use key::{hash_bytes, normalize_prompt, CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheLookup, CacheManager, CacheStats};
