use crate::error_code::StandardErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for configuration and lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "cache.max_size")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config", "cache_manager")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the governance layer.
///
/// Every admission or cache failure is recoverable by the caller; none of
/// these variants indicates a broken process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cache is disabled")]
    CacheDisabled,

    #[error("cache miss")]
    CacheMiss,

    #[error("cached entry was produced for a different auxiliary payload")]
    AuxiliaryMismatch,

    #[error("cache is full ({size}/{max_size} entries)")]
    CacheFull { size: usize, max_size: usize },

    #[error("rate limit exceeded for route '{route}', retry after {}ms", .retry_after.as_millis())]
    RateLimited { route: String, retry_after: Duration },

    #[error("duplicate request within dedup window, retry after {}ms", .retry_after.as_millis())]
    Duplicate { retry_after: Duration },

    #[error("work queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("work queue is closed")]
    QueueClosed,

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Machine-readable code for this error.
    pub fn standard_code(&self) -> StandardErrorCode {
        StandardErrorCode::from_error(self)
    }

    /// Retry hint for admission rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } | Error::Duplicate { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// True for the informational cache outcomes (disabled, miss, mismatch).
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            Error::CacheDisabled | Error::CacheMiss | Error::AuxiliaryMismatch
        )
    }

    /// True when the request was turned away by an admission control.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::RateLimited { .. } | Error::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display_includes_context() {
        let err = Error::configuration_with_context(
            "must be greater than zero",
            ErrorContext::new()
                .with_field_path("cache.max_size")
                .with_source("config"),
        );
        let msg = err.to_string();
        assert!(msg.contains("must be greater than zero"));
        assert!(msg.contains("field: cache.max_size"));
        assert!(msg.contains("source: config"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("cache.max_size")
        );
    }

    #[test]
    fn test_retry_after_only_on_rejections() {
        let limited = Error::RateLimited {
            route: "/api/ai".into(),
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(250)));
        assert!(limited.is_rejection());

        let dup = Error::Duplicate {
            retry_after: Duration::from_millis(900),
        };
        assert_eq!(dup.retry_after(), Some(Duration::from_millis(900)));

        assert_eq!(Error::QueueClosed.retry_after(), None);
        assert!(!Error::CacheMiss.is_rejection());
    }

    #[test]
    fn test_cache_miss_family() {
        assert!(Error::CacheDisabled.is_cache_miss());
        assert!(Error::CacheMiss.is_cache_miss());
        assert!(Error::AuxiliaryMismatch.is_cache_miss());
        assert!(!Error::CacheFull {
            size: 2,
            max_size: 2
        }
        .is_cache_miss());
    }
}
