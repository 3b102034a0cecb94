//! Ordered, dedup-by-kind criteria collection.

use super::{Criterion, CriterionKind, RepositoryContext};
use crate::query::Query;

/// Criteria applied to every read of a repository, in insertion order.
///
/// With overwrite prevention on (the default) pushing a criterion removes any
/// earlier criterion of the same kind, so the new one runs last. The skip
/// flag disables application without touching the contents.
pub struct CriteriaChain {
    criteria: Vec<Box<dyn Criterion>>,
    skip: bool,
    prevent_overwriting: bool,
}

impl Default for CriteriaChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CriteriaChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriteriaChain")
            .field("kinds", &self.kinds())
            .field("skip", &self.skip)
            .field("prevent_overwriting", &self.prevent_overwriting)
            .finish()
    }
}

impl CriteriaChain {
    pub fn new() -> Self {
        Self { criteria: Vec::new(), skip: false, prevent_overwriting: true }
    }

    pub fn push(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.push_boxed(Box::new(criterion))
    }

    pub fn push_boxed(&mut self, criterion: Box<dyn Criterion>) -> &mut Self {
        if self.prevent_overwriting {
            let kind = criterion.kind();
            self.criteria.retain(|existing| existing.kind() != kind);
        }
        self.criteria.push(criterion);
        self
    }

    /// Fold every criterion over `query`, unless skipped.
    pub fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> Query {
        if self.skip {
            return query;
        }
        self.criteria
            .iter()
            .fold(query, |query, criterion| criterion.apply(query, repository))
    }

    pub fn skip(&mut self, status: bool) -> &mut Self {
        self.skip = status;
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Start a fresh unit of work: clears the skip flag, keeps the criteria.
    pub fn reset_scope(&mut self) -> &mut Self {
        self.skip = false;
        self
    }

    /// Remove every criterion.
    pub fn clear(&mut self) -> &mut Self {
        self.criteria.clear();
        self
    }

    pub fn set_prevent_overwriting(&mut self, prevent: bool) -> &mut Self {
        self.prevent_overwriting = prevent;
        self
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Kinds in application order.
    pub fn kinds(&self) -> Vec<CriterionKind> {
        self.criteria.iter().map(|c| c.kind()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Criterion> {
        self.criteria.iter().map(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriterionState, Limit, OrderBy, WhereEquals};
    use crate::query::{Direction, Operator};
    use repocache_core::RequestContext;

    struct Ctx;

    impl RepositoryContext for Ctx {
        fn identity(&self) -> &str {
            "UserRepository"
        }

        fn entity(&self) -> &str {
            "users"
        }

        fn request(&self) -> Option<&RequestContext> {
            None
        }
    }

    /// Appends a marker filter so application order is observable.
    struct Mark(&'static str);

    impl Criterion for Mark {
        fn kind(&self) -> CriterionKind {
            CriterionKind::new(self.0)
        }

        fn apply(&self, query: Query, _repository: &dyn RepositoryContext) -> Query {
            query.filter("mark", Operator::Eq, self.0)
        }

        fn state(&self) -> CriterionState {
            CriterionState::Serialized(self.0.into())
        }
    }

    fn marks(query: &Query) -> Vec<String> {
        query
            .filters
            .iter()
            .filter_map(|f| f.value.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_empty_chain_is_noop() {
        let chain = CriteriaChain::new();
        let query = Query::new("users");
        assert_eq!(chain.apply(query.clone(), &Ctx), query);
    }

    #[test]
    fn test_apply_in_insertion_order() {
        let mut chain = CriteriaChain::new();
        chain.push(Mark("a")).push(Mark("b")).push(Mark("c"));

        let query = chain.apply(Query::new("users"), &Ctx);
        assert_eq!(marks(&query), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_push_same_kind_moves_to_end() {
        let mut chain = CriteriaChain::new();
        chain.push(WhereEquals::new("status", "active"));
        chain.push(OrderBy::new("name", Direction::Asc));
        chain.push(WhereEquals::new("status", "inactive"));

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.kinds(), vec![CriterionKind::of::<OrderBy>(), CriterionKind::of::<WhereEquals>()]);

        let query = chain.apply(Query::new("users"), &Ctx);
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].value, "inactive");
    }

    #[test]
    fn test_overwriting_allowed_keeps_both() {
        let mut chain = CriteriaChain::new();
        chain.set_prevent_overwriting(false);
        chain.push(Limit(10)).push(Limit(5));
        assert_eq!(chain.len(), 2);

        let query = chain.apply(Query::new("users"), &Ctx);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_skip_and_reset_scope() {
        let mut chain = CriteriaChain::new();
        chain.push(Mark("a"));
        chain.skip(true);

        let query = chain.apply(Query::new("users"), &Ctx);
        assert!(query.filters.is_empty());
        assert_eq!(chain.len(), 1);

        chain.reset_scope();
        assert!(!chain.is_skipped());
        assert_eq!(chain.len(), 1);
        assert_eq!(marks(&chain.apply(Query::new("users"), &Ctx)), vec!["a"]);
    }

    #[test]
    fn test_clear() {
        let mut chain = CriteriaChain::new();
        chain.push(Mark("a")).push(Mark("b"));
        chain.clear();
        assert!(chain.is_empty());
    }
}
