//! Stock criteria.

use serde::Serialize;
use serde_json::Value;

use super::{Criterion, CriterionKind, CriterionState, RepositoryContext};
use crate::query::{Direction, Operator, Query};

/// `field = value`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereEquals {
    pub field: String,
    pub value: Value,
}

impl WhereEquals {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

impl Criterion for WhereEquals {
    fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> Query {
        query.filter(self.field.clone(), Operator::Eq, self.value.clone())
    }

    fn state(&self) -> CriterionState {
        CriterionState::of(self)
    }
}

/// `field <op> value`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereCompare {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl WhereCompare {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self { field: field.into(), op, value: value.into() }
    }
}

impl Criterion for WhereCompare {
    fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> Query {
        query.filter(self.field.clone(), self.op, self.value.clone())
    }

    fn state(&self) -> CriterionState {
        CriterionState::of(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self { field: field.into(), direction }
    }
}

impl Criterion for OrderBy {
    fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> Query {
        query.order_by(self.field.clone(), self.direction)
    }

    fn state(&self) -> CriterionState {
        CriterionState::of(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit(pub usize);

impl Criterion for Limit {
    fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> Query {
        query.limit(self.0)
    }

    fn state(&self) -> CriterionState {
        CriterionState::of(self)
    }
}

type ApplyFn = dyn Fn(Query, &dyn RepositoryContext) -> Query + Send + Sync;

/// Ad-hoc criterion built from a closure.
///
/// The closure itself cannot be described, so the criterion carries a name
/// (its dedup kind) and the properties that influence its result. Two
/// closures with the same name and properties are assumed to filter the
/// same way. A closure without declared properties is opaque and disables
/// caching for any read it takes part in.
pub struct Closure {
    name: &'static str,
    properties: Vec<(&'static str, String)>,
    apply: Box<ApplyFn>,
}

impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl Closure {
    pub fn new<F>(name: &'static str, apply: F) -> Self
    where
        F: Fn(Query, &dyn RepositoryContext) -> Query + Send + Sync + 'static,
    {
        Self { name, properties: Vec::new(), apply: Box::new(apply) }
    }

    /// Declare a property that distinguishes this instance from others of the same name.
    pub fn property(mut self, name: &'static str, value: impl std::fmt::Display) -> Self {
        self.properties.push((name, value.to_string()));
        self
    }
}

impl Criterion for Closure {
    fn kind(&self) -> CriterionKind {
        CriterionKind::new(self.name)
    }

    fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> Query {
        (self.apply)(query, repository)
    }

    fn state(&self) -> CriterionState {
        if self.properties.is_empty() {
            CriterionState::Opaque
        } else {
            CriterionState::Structural(self.properties.clone())
        }
    }
}
