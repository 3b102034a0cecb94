//! Registry-driven cache invalidation.

use std::sync::Arc;

use async_trait::async_trait;
use repocache_core::{CacheBackend, CleanConfig, KeyRegistry};

use super::{MutationListener, MutationNotification, RepositoryAction};

/// What a sweep did. Returned for callers that drive sweeps by hand (tests, CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// Invalidation is switched off globally.
    Disabled,
    /// Invalidation is switched off for this action.
    Skipped(RepositoryAction),
    /// The registry could not be read; nothing was evicted.
    RegistryUnavailable,
    /// Every registered key was sent to the backend.
    Swept {
        /// Keys registered for the repository.
        keys: usize,
        /// Keys that held a live entry and were removed.
        evicted: usize,
        /// Keys whose eviction failed.
        failed: usize,
    },
}

/// Evicts every registered key of a repository when it is written to.
///
/// Eviction is best-effort: failures are logged at error level and never
/// reach the write that triggered them. The registry itself is not pruned,
/// so the next sweep still covers every key ever issued.
pub struct InvalidationHandler {
    cache: Arc<dyn CacheBackend>,
    registry: Arc<KeyRegistry>,
    clean: CleanConfig,
}

impl std::fmt::Debug for InvalidationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationHandler")
            .field("registry", &self.registry)
            .field("clean", &self.clean)
            .finish_non_exhaustive()
    }
}

impl InvalidationHandler {
    pub fn new(cache: Arc<dyn CacheBackend>, registry: Arc<KeyRegistry>, clean: CleanConfig) -> Self {
        Self { cache, registry, clean }
    }

    pub async fn handle(&self, notification: &MutationNotification) -> InvalidationOutcome {
        if !self.clean.enabled {
            return InvalidationOutcome::Disabled;
        }
        let action = notification.action;
        if !self.clean.enabled_for(action.as_str()) {
            tracing::debug!(repository = %notification.repository, action = action.as_str(), "invalidation off for action");
            return InvalidationOutcome::Skipped(action);
        }

        self.sweep(&notification.repository, action).await
    }

    /// Forget every key registered for `repository`.
    pub async fn sweep(&self, repository: &str, action: RepositoryAction) -> InvalidationOutcome {
        let keys = match self.registry.get_keys(repository).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(repository, action = action.as_str(), error = %e, "cannot read key registry");
                return InvalidationOutcome::RegistryUnavailable;
            }
        };

        let mut evicted = 0;
        let mut failed = 0;
        for key in &keys {
            match self.cache.forget(key).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::error!(repository, key = %key, error = %e, "cache eviction failed");
                }
            }
        }

        tracing::info!(repository, action = action.as_str(), keys = keys.len(), evicted, failed, "invalidation sweep");
        InvalidationOutcome::Swept { keys: keys.len(), evicted, failed }
    }
}

#[async_trait]
impl MutationListener for InvalidationHandler {
    async fn on_mutation(&self, notification: &MutationNotification) {
        self.handle(notification).await;
    }
}
