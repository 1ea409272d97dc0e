//! Offline engine configuration.
//!
//! Provides a unified `OfflineConfig` struct used by every host (CLI, desktop
//! shells, tests) to tune debounce, timeouts, retry policy and cache budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_DEBOUNCE_MS: u64 = 400;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 200;
const DEFAULT_CACHE_MAX_BYTES: u64 = 25 * 1024 * 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Tunables for the offline engine.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OfflineConfig {
    /// How long a connectivity change must hold before it is published
    pub debounce_ms: u64,
    /// Timeout for each remote submit or fetch
    pub request_timeout_secs: u64,
    /// Attempts before a transiently failing draft is marked failed
    pub max_retries: u32,
    /// First backoff delay; doubles on each further retry
    pub backoff_base_secs: u64,
    /// Upper bound for a single backoff delay
    pub backoff_max_secs: u64,
    /// Maximum number of cached blogs
    pub cache_max_entries: usize,
    /// Maximum serialized size of all cached blogs
    pub cache_max_bytes: u64,
    /// Age after which a cached blog is refetched by the preloader
    pub cache_ttl_secs: u64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl OfflineConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.backoff_base_secs),
            max_delay: Duration::from_secs(self.backoff_max_secs),
        }
    }

    pub const fn cache_budget(&self) -> CacheBudget {
        CacheBudget {
            max_entries: self.cache_max_entries,
            max_bytes: self.cache_max_bytes,
        }
    }

    /// Reject values that would disable the engine's guarantees.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            return Err("backoff_max_secs must not be below backoff_base_secs".to_string());
        }
        if self.cache_max_entries == 0 || self.cache_max_bytes == 0 {
            return Err("cache budget must allow at least one entry".to_string());
        }
        Ok(())
    }
}

/// Parse and validate an offline config from a raw JSON payload.
pub fn parse_offline_config(payload: &str) -> Result<OfflineConfig, String> {
    let config: OfflineConfig = serde_json::from_str(payload)
        .map_err(|error| format!("invalid offline config JSON: {error}"))?;
    config.validate()?;
    Ok(config)
}

/// Retry cap and exponential backoff for transient sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the next attempt after `retry_count` failed attempts.
    ///
    /// `base * 2^(retry_count - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether a draft with `retry_count` failed attempts is out of retries.
    pub const fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        OfflineConfig::default().retry_policy()
    }
}

/// Upper bounds for the offline content cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    pub max_entries: usize,
    pub max_bytes: u64,
}

impl Default for CacheBudget {
    fn default() -> Self {
        OfflineConfig::default().cache_budget()
    }
}
