//! Composable query criteria.
//!
//! A criterion is a named, reusable transformation of a `Query`. Criteria
//! are pushed onto a repository's `CriteriaChain` and applied in order before
//! every read.
//!
//! Each criterion also describes itself through `state()` so cached reads
//! can fold the active chain into their cache key. Criteria that capture
//! closures cannot serialize; they report their declared properties instead
//! (`CriterionState::Structural`).

pub mod builtin;
pub mod chain;

pub use builtin::{Closure, Limit, OrderBy, WhereCompare, WhereEquals};
pub use chain::CriteriaChain;

use repocache_core::RequestContext;
use serde::Serialize;
use serde_json::Value;

use crate::query::Query;

/// Identity of a criterion for deduplication.
///
/// Two criteria of the same kind never coexist in a chain that prevents
/// overwriting, whatever their field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CriterionKind(&'static str);

impl CriterionKind {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The kind named after a Rust type.
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// What a criterion contributes to a cache fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionState {
    /// The criterion's full configuration.
    Serialized(Value),
    /// Declared property names with a stable rendering of each value.
    Structural(Vec<(&'static str, String)>),
    /// Nothing stable to describe; calls under this criterion are not cacheable.
    Opaque,
}

impl CriterionState {
    /// Serialize `value`, degrading to `Opaque` when serde refuses.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value).map_or(CriterionState::Opaque, CriterionState::Serialized)
    }
}

/// Read-side view of the repository a criterion is applied for.
pub trait RepositoryContext: Send + Sync {
    /// Identity used for cache keys and invalidation, e.g. `UserRepository`.
    fn identity(&self) -> &str;

    /// Entity (table, collection) the repository reads.
    fn entity(&self) -> &str;

    /// Request driving the current unit of work, if any.
    fn request(&self) -> Option<&RequestContext>;
}

/// A query transformation.
pub trait Criterion: Send + Sync {
    /// Dedup identity. Defaults to the implementing type.
    fn kind(&self) -> CriterionKind {
        CriterionKind::of::<Self>()
    }

    fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> Query;

    fn state(&self) -> CriterionState;
}
