//! 请求去重模块：在短时间窗口内拒绝完全相同的重复提交。
//!
//! # Request Deduplication Module
//!
//! Clients that double-submit (retrying buttons, impatient reloads) would
//! otherwise trigger two identical, costly backend calls. The guard keeps a
//! fingerprint → last-seen map and turns away a second identical
//! state-changing request that arrives within the window.
//!
//! ```rust,no_run
//! use ai_gate::dedup::{DedupConfig, DedupGuard};
//! use std::time::Duration;
//!
//! # async fn demo() -> ai_gate::Result<()> {
//! let guard = DedupGuard::new(DedupConfig::new().with_window(Duration::from_secs(1)))?;
//! guard.check_request("POST", "/api/recipes", br#"{"dish":"curry"}"#)?;
//! assert!(guard.check_request("POST", "/api/recipes", br#"{"dish":"curry"}"#).is_err());
//! guard.close().await;
//! # Ok(())
//! # }
//! ```

mod guard;

pub use guard::{
    fingerprint, is_state_changing, DedupConfig, DedupGuard, DedupStats, RETENTION_WINDOWS,
};
