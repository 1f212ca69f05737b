//! 标准错误码：为治理层的每种拒绝与失败提供稳定的机器可读信号。
//!
//! Standard governance error codes.
//!
//! Every [`Error`](crate::Error) maps to one code so that request-handling code
//! can surface rejections to clients without matching on error variants.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category    | Description                           |
//! |--------|-------------|---------------------------------------|
//! | E1xxx  | cache       | Response cache outcomes               |
//! | E2xxx  | admission   | Rate limiting and deduplication       |
//! | E3xxx  | queue       | Work queue capacity and lifecycle     |
//! | E4xxx  | operational | Cancellation and configuration        |
//! | E9xxx  | unknown     | Catch-all / unclassified              |
//!
//! ## Example
//!
//! ```rust
//! use ai_gate::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::from_name("rate_limited");
//! assert_eq!(code.code(), "E2001");
//! assert!(code.retryable());
//! assert_eq!(code.http_status(), 429);
//! ```

use crate::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// E1001: Caching is switched off; informational
    CacheDisabled,
    /// E1002: Key absent or expired
    CacheMiss,
    /// E1003: Auxiliary payload changed since the entry was cached
    AuxiliaryMismatch,
    /// E1004: Write rejected after the eviction escalation
    CacheFull,
    /// E2001: Token bucket for the route is empty
    RateLimited,
    /// E2002: Identical request seen within the dedup window
    DuplicateRequest,
    /// E3001: Work queue at capacity
    QueueFull,
    /// E3002: Work queue no longer accepts items
    QueueClosed,
    /// E4001: Caller cancelled while waiting
    Cancelled,
    /// E4002: Invalid configuration
    InvalidConfig,
    /// E9999: Error could not be classified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E2001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CacheDisabled => "E1001",
            Self::CacheMiss => "E1002",
            Self::AuxiliaryMismatch => "E1003",
            Self::CacheFull => "E1004",
            Self::RateLimited => "E2001",
            Self::DuplicateRequest => "E2002",
            Self::QueueFull => "E3001",
            Self::QueueClosed => "E3002",
            Self::Cancelled => "E4001",
            Self::InvalidConfig => "E4002",
            Self::Unknown => "E9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheDisabled => "cache_disabled",
            Self::CacheMiss => "cache_miss",
            Self::AuxiliaryMismatch => "auxiliary_mismatch",
            Self::CacheFull => "cache_full",
            Self::RateLimited => "rate_limited",
            Self::DuplicateRequest => "duplicate_request",
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid_config",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the same request may succeed if retried later.
    ///
    /// A duplicate is not retryable: the first submission is already in flight.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::QueueFull | Self::CacheFull)
    }

    /// Returns the category: `"cache"`, `"admission"`, `"queue"`, `"operational"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::CacheDisabled | Self::CacheMiss | Self::AuxiliaryMismatch | Self::CacheFull => {
                "cache"
            }
            Self::RateLimited | Self::DuplicateRequest => "admission",
            Self::QueueFull | Self::QueueClosed => "queue",
            Self::Cancelled | Self::InvalidConfig => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Suggested HTTP status for surfacing this condition to an end client.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited | Self::DuplicateRequest => 429,
            Self::QueueFull | Self::QueueClosed | Self::CacheFull | Self::CacheDisabled => 503,
            Self::CacheMiss | Self::AuxiliaryMismatch => 404,
            Self::Cancelled => 499,
            Self::InvalidConfig | Self::Unknown => 500,
        }
    }

    /// Maps a standard name back to its code. Unknown names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cache_disabled" => Self::CacheDisabled,
            "cache_miss" => Self::CacheMiss,
            "auxiliary_mismatch" => Self::AuxiliaryMismatch,
            "cache_full" => Self::CacheFull,
            "rate_limited" | "too_many_requests" => Self::RateLimited,
            "duplicate_request" | "duplicate" => Self::DuplicateRequest,
            "queue_full" => Self::QueueFull,
            "queue_closed" => Self::QueueClosed,
            "cancelled" => Self::Cancelled,
            "invalid_config" => Self::InvalidConfig,
            _ => Self::Unknown,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::CacheDisabled => Self::CacheDisabled,
            Error::CacheMiss => Self::CacheMiss,
            Error::AuxiliaryMismatch => Self::AuxiliaryMismatch,
            Error::CacheFull { .. } => Self::CacheFull,
            Error::RateLimited { .. } => Self::RateLimited,
            Error::Duplicate { .. } => Self::DuplicateRequest,
            Error::QueueFull { .. } => Self::QueueFull,
            Error::QueueClosed => Self::QueueClosed,
            Error::Cancelled => Self::Cancelled,
            Error::Configuration { .. } | Error::Yaml(_) => Self::InvalidConfig,
            Error::Io(_) | Error::Serialization(_) => Self::Unknown,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
