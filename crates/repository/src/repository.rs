//! The base repository.
//!
//! A `Repository` owns a criteria chain, builds a `Query` for each read, and
//! hands it to its `RecordStore`. Writes go straight to the store, wrapped
//! in mutation notifications.

use std::sync::Arc;

use repocache_core::{Error, RequestContext};
use serde_json::Value;

use crate::criteria::{CriteriaChain, Criterion, RepositoryContext};
use crate::events::{MutationNotification, NotificationBus, RepositoryAction};
use crate::query::{Condition, Joiner, Operator, Page, PageMode, Query, Record};
use crate::store::RecordStore;

/// Primary key column used by `find`, `update_rich` and `delete`.
pub const ID_COLUMN: &str = "id";

pub struct Repository<S> {
    identity: String,
    entity: String,
    store: Arc<S>,
    criteria: CriteriaChain,
    bus: Arc<NotificationBus>,
    request: Option<RequestContext>,
}

impl<S> std::fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("identity", &self.identity)
            .field("entity", &self.entity)
            .field("criteria", &self.criteria)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> Repository<S> {
    /// A repository named `identity` over the `entity` table of `store`.
    ///
    /// The identity groups cache keys and invalidation, so it must be unique
    /// per repository type, e.g. `UserRepository`.
    pub fn new(identity: impl Into<String>, entity: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            identity: identity.into(),
            entity: entity.into(),
            store,
            criteria: CriteriaChain::new(),
            bus: Arc::new(NotificationBus::new()),
            request: None,
        }
    }

    /// Publish mutations on a shared bus instead of a private one.
    pub fn with_bus(mut self, bus: Arc<NotificationBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    /// Replace the request driving the current unit of work.
    pub fn set_request(&mut self, request: Option<RequestContext>) -> &mut Self {
        self.request = request;
        self
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn criteria(&self) -> &CriteriaChain {
        &self.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut CriteriaChain {
        &mut self.criteria
    }

    pub fn push_criteria(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.criteria.push(criterion);
        self
    }

    pub fn skip_criteria(&mut self, status: bool) -> &mut Self {
        self.criteria.skip(status);
        self
    }

    pub fn reset_scope(&mut self) -> &mut Self {
        self.criteria.reset_scope();
        self
    }

    /// Base query with the criteria chain applied.
    pub fn scoped_query(&self) -> Query {
        self.criteria.apply(Query::new(self.entity.clone()), self)
    }

    pub async fn all(&self, columns: &[&str]) -> Result<Vec<Record>, Error> {
        self.store.fetch_many(&self.scoped_query().select(columns)).await
    }

    pub async fn find(&self, id: &Value, columns: &[&str]) -> Result<Option<Record>, Error> {
        let query = self.scoped_query().filter(ID_COLUMN, Operator::Eq, id.clone()).select(columns);
        self.store.fetch_one(&query).await
    }

    /// First record whose `field` equals `value`.
    pub async fn find_by(&self, field: &str, value: &Value, columns: &[&str]) -> Result<Option<Record>, Error> {
        let query = self.scoped_query().filter(field, Operator::Eq, value.clone()).select(columns);
        self.store.fetch_one(&query).await
    }

    pub async fn find_all_by(&self, field: &str, value: &Value, columns: &[&str]) -> Result<Vec<Record>, Error> {
        let query = self.scoped_query().filter(field, Operator::Eq, value.clone()).select(columns);
        self.store.fetch_many(&query).await
    }

    /// Records matching every condition, or any condition when `or` is set.
    pub async fn find_where(&self, conditions: &[Condition], columns: &[&str], or: bool) -> Result<Vec<Record>, Error> {
        let joiner = if or { Joiner::Or } else { Joiner::And };
        let query = conditions
            .iter()
            .fold(self.scoped_query(), |query, condition| query.condition(condition, joiner))
            .select(columns);
        self.store.fetch_many(&query).await
    }

    pub async fn paginate(&self, per_page: usize, page: usize, columns: &[&str], mode: PageMode) -> Result<Page, Error> {
        let query = self.scoped_query().select(columns);
        self.store.fetch_page(&query, per_page, page, mode).await
    }

    /// Pluck `value` from every record.
    ///
    /// Without `key` the result is an array. With `key` it is an object
    /// mapping each record's `key` (stringified) to its `value`; later
    /// records win on duplicate keys.
    pub async fn lists(&self, value: &str, key: Option<&str>) -> Result<Value, Error> {
        let records = self.store.fetch_many(&self.scoped_query()).await?;
        let pluck = |record: &Record, field: &str| record.get(field).cloned().unwrap_or(Value::Null);

        Ok(match key {
            None => Value::Array(records.iter().map(|r| pluck(r, value)).collect()),
            Some(key) => Value::Object(
                records
                    .iter()
                    .map(|r| {
                        let name = match pluck(r, key) {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (name, pluck(r, value))
                    })
                    .collect(),
            ),
        })
    }

    /// Records matching the chain plus `criterion`, applied last.
    pub async fn get_by_criteria(&self, criterion: &dyn Criterion) -> Result<Vec<Record>, Error> {
        let query = criterion.apply(self.scoped_query(), self);
        self.store.fetch_many(&query).await
    }

    pub async fn create(&self, data: Record) -> Result<Record, Error> {
        self.notify(RepositoryAction::Creating, Some(data.clone())).await;
        let stored = self.store.insert(&self.entity, data).await?;
        tracing::debug!(repository = %self.identity, "created record");
        self.notify(RepositoryAction::Created, Some(stored.clone())).await;
        Ok(stored)
    }

    /// Merge `data` into every record whose `attribute` equals `id`.
    ///
    /// Criteria do not scope writes. Returns the number of records updated.
    pub async fn update(&self, data: Record, id: &Value, attribute: &str) -> Result<u64, Error> {
        self.notify(RepositoryAction::Updating, Some(data.clone())).await;
        let query = Query::new(self.entity.clone()).filter(attribute, Operator::Eq, id.clone());
        let updated = self.store.update_where(&query, &data).await?;
        tracing::debug!(repository = %self.identity, updated, "updated records");
        self.notify(RepositoryAction::Updated, Some(data)).await;
        Ok(updated)
    }

    /// Load the record with primary key `id`, merge `data` into it and save it.
    ///
    /// # Errors
    ///
    /// Returns `Error::RecordNotFound` if no such record exists.
    pub async fn update_rich(&self, data: Record, id: &Value) -> Result<Record, Error> {
        let query = Query::new(self.entity.clone()).filter(ID_COLUMN, Operator::Eq, id.clone());
        let Some(mut record) = self.store.fetch_one(&query).await? else {
            return Err(Error::RecordNotFound(format!("{} with {ID_COLUMN} {id}", self.entity)));
        };

        self.notify(RepositoryAction::Updating, Some(record.clone())).await;
        self.store.update_where(&query, &data).await?;
        record.extend(data);
        self.notify(RepositoryAction::Updated, Some(record.clone())).await;
        Ok(record)
    }

    /// Delete the records with the given primary keys. Returns the number deleted.
    pub async fn delete(&self, ids: &[Value]) -> Result<u64, Error> {
        self.notify(RepositoryAction::Deleting, None).await;
        let query = Query::new(self.entity.clone()).filter(ID_COLUMN, Operator::In, Value::Array(ids.to_vec()));
        let deleted = self.store.delete_where(&query).await?;
        tracing::debug!(repository = %self.identity, deleted, "deleted records");
        self.notify(RepositoryAction::Deleted, None).await;
        Ok(deleted)
    }

    async fn notify(&self, action: RepositoryAction, record: Option<Record>) {
        self.bus.publish(&MutationNotification::new(self.identity.clone(), action, record)).await;
    }
}

impl<S: RecordStore> RepositoryContext for Repository<S> {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn entity(&self) -> &str {
        &self.entity
    }

    fn request(&self) -> Option<&RequestContext> {
        self.request.as_ref()
    }
}
