//! Mutation notifications.
//!
//! Every repository write publishes an `-ing` notification before touching
//! the store and an `-ed` notification after. Publishing awaits each
//! listener in subscription order, so by the time a write returns every
//! listener (in particular the invalidation handler) has finished.

pub mod invalidation;

pub use invalidation::{InvalidationHandler, InvalidationOutcome};

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::Record;

/// The write phase a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryAction {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl RepositoryAction {
    pub const ALL: [RepositoryAction; 6] = [
        RepositoryAction::Creating,
        RepositoryAction::Created,
        RepositoryAction::Updating,
        RepositoryAction::Updated,
        RepositoryAction::Deleting,
        RepositoryAction::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryAction::Creating => "creating",
            RepositoryAction::Created => "created",
            RepositoryAction::Updating => "updating",
            RepositoryAction::Updated => "updated",
            RepositoryAction::Deleting => "deleting",
            RepositoryAction::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for RepositoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write on a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationNotification {
    /// Identity of the repository that performed the write.
    pub repository: String,
    /// Affected record when one is known (the created or updated row).
    pub record: Option<Record>,
    pub action: RepositoryAction,
}

impl MutationNotification {
    pub fn new(repository: impl Into<String>, action: RepositoryAction, record: Option<Record>) -> Self {
        Self { repository: repository.into(), record, action }
    }
}

/// Receives mutation notifications.
///
/// Listeners cannot fail the write that notified them; anything that goes
/// wrong inside `on_mutation` is the listener's to log.
#[async_trait]
pub trait MutationListener: Send + Sync {
    async fn on_mutation(&self, notification: &MutationNotification);
}

/// In-process publish/subscribe of mutation notifications.
#[derive(Default)]
pub struct NotificationBus {
    listeners: RwLock<Vec<Arc<dyn MutationListener>>>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus").field("listeners", &self.listener_count()).finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Listeners run in subscription order.
    pub fn subscribe(&self, listener: Arc<dyn MutationListener>) {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver `notification` to every listener, one after another.
    pub async fn publish(&self, notification: &MutationNotification) {
        // Snapshot so no lock is held across an await.
        let listeners: Vec<_> = self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone();

        tracing::debug!(
            repository = %notification.repository,
            action = notification.action.as_str(),
            listeners = listeners.len(),
            "publishing mutation"
        );

        for listener in listeners {
            listener.on_mutation(notification).await;
        }
    }
}
