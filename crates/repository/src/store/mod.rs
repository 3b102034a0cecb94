//! The persistence seam.
//!
//! Repositories never talk to a database directly; they hand a `Query` to a
//! `RecordStore`. Any ORM or driver exposing these operations can back a
//! repository.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use repocache_core::Error;

use crate::query::{Page, PageMode, Query, Record};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// First record matching `query`, if any.
    async fn fetch_one(&self, query: &Query) -> Result<Option<Record>, Error>;

    /// Every record matching `query`.
    async fn fetch_many(&self, query: &Query) -> Result<Vec<Record>, Error>;

    /// One 1-based page of the records matching `query`.
    async fn fetch_page(&self, query: &Query, per_page: usize, page: usize, mode: PageMode) -> Result<Page, Error>;

    /// Insert into `entity`, returning the stored record with its identifier.
    async fn insert(&self, entity: &str, data: Record) -> Result<Record, Error>;

    /// Merge `data` into every record matching `query`. Returns the number updated.
    async fn update_where(&self, query: &Query, data: &Record) -> Result<u64, Error>;

    /// Delete every record matching `query`. Returns the number deleted.
    async fn delete_where(&self, query: &Query) -> Result<u64, Error>;
}
