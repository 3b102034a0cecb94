//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Longest accepted cache lifetime: one year, in minutes.
pub const MAX_CACHE_MINUTES: u64 = 525_600;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache.minutes` is 0 or exceeds one year
    /// - `cache.params.skip_cache` is empty
    /// - `registry.file` is empty or contains a path separator
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.minutes == 0 {
            return Err(ConfigError::Invalid { field: "cache.minutes".into(), reason: "must be greater than 0".into() });
        }
        if self.cache.minutes > MAX_CACHE_MINUTES {
            return Err(ConfigError::Invalid {
                field: "cache.minutes".into(),
                reason: "must not exceed one year (525600 minutes)".into(),
            });
        }

        if self.cache.params.skip_cache.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cache.params.skip_cache".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.registry.file.is_empty() {
            return Err(ConfigError::Missing {
                field: "registry.file".into(),
                hint: "Set REPOCACHE_REGISTRY__FILE to a file name".into(),
            });
        }
        if self.registry.file.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "registry.file".into(),
                reason: "must be a bare file name; use registry.dir for the directory".into(),
            });
        }

        let allowed = &self.cache.allowed;
        if allowed.only.is_some() && allowed.except.is_some() {
            tracing::warn!(
                only_count = allowed.only.as_ref().map_or(0, Vec::len),
                except_count = allowed.except.as_ref().map_or(0, Vec::len),
                "Both cache.allowed.only and cache.allowed.except are set; \
                 the deny-list takes precedence"
            );
        }

        Ok(())
    }
}
