//! Repositories with composable criteria and a read-through cache.
//!
//! This crate provides:
//! - A storage-neutral `Query` and the `RecordStore` seam, with an in-memory store
//! - Criteria and the dedup-by-kind `CriteriaChain`
//! - The base `Repository` and its mutation notifications
//! - `CachedRepository`, which memoizes reads and registers every cache key
//! - `InvalidationHandler`, which sweeps a repository's keys on writes

pub mod cached;
pub mod criteria;
pub mod events;
pub mod query;
pub mod repository;
pub mod store;

pub use cached::{CacheStatus, CachedRepository, KeyDeriver};
pub use criteria::{CriteriaChain, Criterion, CriterionKind, CriterionState, RepositoryContext};
pub use events::{
    InvalidationHandler, InvalidationOutcome, MutationListener, MutationNotification, NotificationBus,
    RepositoryAction,
};
pub use query::{Condition, Direction, Operator, Page, PageMode, Query, Record};
pub use repository::Repository;
pub use store::{MemoryStore, RecordStore};
