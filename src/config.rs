//! Governance configuration: YAML file, environment overrides, validation.
//!
//! ```yaml
//! cache:
//!   enabled: true
//!   max_size: 1000
//!   ttl: 24h
//!   cleanup_interval: 10m
//! rate_limit:
//!   enabled: true
//!   requests: 100
//!   window: 1m
//! dedup:
//!   enabled: true
//!   window: 1s
//!   sweep_interval: 10m
//! queue:
//!   max_size: 100
//!   workers: 5
//! ```
//!
//! Every section and field is optional; missing values take the defaults
//! shown above.

use crate::cache::CacheConfig;
use crate::dedup::DedupConfig;
use crate::queue::QueueConfig;
use crate::resilience::rate_limiter::RateLimiterConfig;
use crate::utils::duration;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "AI_GATE_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub cache: CacheConfig,
    pub rate_limit: RateLimiterConfig,
    pub dedup: DedupConfig,
    pub queue: QueueConfig,
}

impl GovernanceConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read a YAML file, apply `AI_GATE_*` overrides from the process
    /// environment and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content).map_err(|e| match e {
            Error::Yaml(inner) => Error::configuration_with_context(
                "failed to parse configuration file",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(inner.to_string())
                    .with_source("config"),
            ),
            other => other,
        })?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which receives the full variable name
    /// (e.g. `AI_GATE_CACHE_TTL`). Unparseable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|v| (name, v))
        };

        override_parsed(&get("CACHE_ENABLED"), parse_bool, &mut self.cache.enabled);
        override_parsed(&get("CACHE_MAX_SIZE"), parse_num, &mut self.cache.max_size);
        override_parsed(&get("CACHE_TTL"), duration::parse, &mut self.cache.ttl);
        override_parsed(
            &get("CACHE_CLEANUP_INTERVAL"),
            duration::parse,
            &mut self.cache.cleanup_interval,
        );
        override_parsed(&get("RATE_LIMIT_ENABLED"), parse_bool, &mut self.rate_limit.enabled);
        override_parsed(&get("RATE_LIMIT_REQUESTS"), parse_num, &mut self.rate_limit.requests);
        override_parsed(&get("RATE_LIMIT_WINDOW"), duration::parse, &mut self.rate_limit.window);
        override_parsed(&get("DEDUP_ENABLED"), parse_bool, &mut self.dedup.enabled);
        override_parsed(&get("DEDUP_WINDOW"), duration::parse, &mut self.dedup.window);
        override_parsed(
            &get("DEDUP_SWEEP_INTERVAL"),
            duration::parse,
            &mut self.dedup.sweep_interval,
        );
        override_parsed(&get("QUEUE_MAX_SIZE"), parse_num, &mut self.queue.max_size);
        override_parsed(&get("QUEUE_WORKERS"), parse_num, &mut self.queue.workers);
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if self.rate_limit.enabled {
            let field = if self.rate_limit.requests == 0 {
                Some("requests")
            } else if self.rate_limit.window.is_zero() {
                Some("window")
            } else {
                None
            };
            if let Some(field) = field {
                return Err(Error::configuration_with_context(
                    format!("invalid rate limit {}", field),
                    ErrorContext::new()
                        .with_field_path(format!("rate_limit.{}", field))
                        .with_source("config"),
                ));
            }
        }
        self.dedup.validate()?;
        self.queue.validate()?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_num<T: FromStr>(s: &str) -> Option<T> {
    s.trim().parse().ok()
}

fn override_parsed<T, P>(entry: &Option<(String, String)>, parse: P, target: &mut T)
where
    P: Fn(&str) -> Option<T>,
{
    let Some((name, raw)) = entry else {
        return;
    };
    match parse(raw) {
        Some(v) => *target = v,
        None => tracing::warn!(variable = name.as_str(), value = raw.as_str(), "ignoring invalid override"),
    }
}
