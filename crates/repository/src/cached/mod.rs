//! Read-through caching decorator.
//!
//! `CachedRepository` wraps a `Repository` and memoizes its reads. Each
//! cached read goes through one gate:
//!
//! - caching off, method not allowed, or bypass requested: run the read
//!   directly, derive nothing, register nothing
//! - otherwise derive (and register) a key and get-or-compute it in the
//!   backend
//!
//! A key that cannot be derived because some criterion has no stable state
//! degrades to a direct read. Backend failures propagate.

pub mod key;

pub use key::KeyDeriver;

use std::future::Future;
use std::sync::Arc;

use repocache_core::config::{MAX_CACHE_MINUTES, method_allowed};
use repocache_core::{CacheBackend, CacheConfig, Error, RequestContext, remember_json};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::criteria::{CriteriaChain, Criterion, RepositoryContext};
use crate::query::{Condition, Page, PageMode, Record};
use crate::repository::Repository;
use crate::store::RecordStore;

/// How the last cached read was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Cache not consulted.
    Direct,
    /// Served from the backend; the store was not queried.
    Hit,
    /// Computed from the store and written to the backend.
    Miss,
}

pub struct CachedRepository<S> {
    repository: Repository<S>,
    cache: Arc<dyn CacheBackend>,
    deriver: KeyDeriver,
    config: CacheConfig,
    cache_minutes: Option<u64>,
    cache_only: Option<Vec<String>>,
    cache_except: Option<Vec<String>>,
    skip_cache: bool,
    last_status: Option<CacheStatus>,
}

impl<S> std::fmt::Debug for CachedRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("repository", &self.repository)
            .field("cache_minutes", &self.cache_minutes)
            .field("skip_cache", &self.skip_cache)
            .field("last_status", &self.last_status)
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> CachedRepository<S> {
    pub fn new(repository: Repository<S>, cache: Arc<dyn CacheBackend>, deriver: KeyDeriver, config: CacheConfig) -> Self {
        Self {
            repository,
            cache,
            deriver,
            config,
            cache_minutes: None,
            cache_only: None,
            cache_except: None,
            skip_cache: false,
            last_status: None,
        }
    }

    /// Override the configured TTL for this repository.
    ///
    /// Clamped to `MAX_CACHE_MINUTES`, the same ceiling configuration enforces.
    pub fn with_cache_minutes(mut self, minutes: u64) -> Self {
        if minutes > MAX_CACHE_MINUTES {
            tracing::warn!(
                repository = self.repository.identity(),
                minutes,
                max = MAX_CACHE_MINUTES,
                "cache minutes override clamped"
            );
        }
        self.cache_minutes = Some(minutes.min(MAX_CACHE_MINUTES));
        self
    }

    /// Override the configured allow-list for this repository.
    pub fn with_cache_only(mut self, methods: &[&str]) -> Self {
        self.cache_only = Some(methods.iter().map(|m| (*m).to_string()).collect());
        self
    }

    /// Override the configured deny-list for this repository.
    pub fn with_cache_except(mut self, methods: &[&str]) -> Self {
        self.cache_except = Some(methods.iter().map(|m| (*m).to_string()).collect());
        self
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut Repository<S> {
        &mut self.repository
    }

    pub fn criteria(&self) -> &CriteriaChain {
        self.repository.criteria()
    }

    pub fn push_criteria(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.repository.push_criteria(criterion);
        self
    }

    pub fn skip_criteria(&mut self, status: bool) -> &mut Self {
        self.repository.skip_criteria(status);
        self
    }

    pub fn reset_scope(&mut self) -> &mut Self {
        self.repository.reset_scope();
        self
    }

    pub fn set_request(&mut self, request: Option<RequestContext>) -> &mut Self {
        self.repository.set_request(request);
        self
    }

    /// Bypass the cache for this instance until switched back.
    pub fn skip_cache(&mut self, status: bool) -> &mut Self {
        self.skip_cache = status;
        self
    }

    /// Whether the instance flag or the current request asks for a bypass.
    pub fn is_skipped_cache(&self) -> bool {
        self.skip_cache
            || self
                .repository
                .request()
                .is_some_and(|request| request.bypass_requested(&self.config.params.skip_cache))
    }

    /// Whether `method` may be cached at all, ignoring bypass requests.
    pub fn allowed_cache(&self, method: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let only = self.cache_only.as_deref().or(self.config.allowed.only.as_deref());
        let except = self.cache_except.as_deref().or(self.config.allowed.except.as_deref());
        method_allowed(only, except, method)
    }

    pub fn cache_minutes(&self) -> u64 {
        self.cache_minutes.unwrap_or(self.config.minutes)
    }

    /// Derive and register the key `method` would use with `args` right now.
    pub async fn cache_key(&self, method: &str, args: &Value) -> Result<String, Error> {
        self.deriver
            .derive(
                self.repository.identity(),
                method,
                args,
                self.repository.criteria(),
                self.repository.request(),
            )
            .await
    }

    pub fn last_status(&self) -> Option<CacheStatus> {
        self.last_status
    }

    pub async fn all(&mut self, columns: &[&str]) -> Result<Vec<Record>, Error> {
        let served = self.read("all", &json!([columns]), self.repository.all(columns)).await?;
        Ok(self.settle(served))
    }

    pub async fn find(&mut self, id: &Value, columns: &[&str]) -> Result<Option<Record>, Error> {
        let served = self.read("find", &json!([id, columns]), self.repository.find(id, columns)).await?;
        Ok(self.settle(served))
    }

    /// Every record whose `field` equals `value`.
    pub async fn find_by_field(&mut self, field: &str, value: &Value, columns: &[&str]) -> Result<Vec<Record>, Error> {
        let args = json!([field, value, columns]);
        let served = self.read("find_by_field", &args, self.repository.find_all_by(field, value, columns)).await?;
        Ok(self.settle(served))
    }

    pub async fn find_where(&mut self, conditions: &[Condition], columns: &[&str], or: bool) -> Result<Vec<Record>, Error> {
        let args = json!([conditions, columns, or]);
        let served = self.read("find_where", &args, self.repository.find_where(conditions, columns, or)).await?;
        Ok(self.settle(served))
    }

    pub async fn paginate(&mut self, per_page: usize, page: usize, columns: &[&str], mode: PageMode) -> Result<Page, Error> {
        let args = json!([per_page, page, columns, mode]);
        let served = self.read("paginate", &args, self.repository.paginate(per_page, page, columns, mode)).await?;
        Ok(self.settle(served))
    }

    /// Cached `Repository::get_by_criteria`. The extra criterion takes part
    /// in the key; an opaque one makes the call direct.
    pub async fn get_by_criteria(&mut self, criterion: &dyn Criterion) -> Result<Vec<Record>, Error> {
        let served = match key::criterion_state(criterion) {
            Ok(args) => self.read("get_by_criteria", &args, self.repository.get_by_criteria(criterion)).await?,
            Err(e) => {
                tracing::warn!(repository = self.repository.identity(), method = "get_by_criteria", error = %e, "criterion not cacheable, reading directly");
                (self.repository.get_by_criteria(criterion).await?, CacheStatus::Direct)
            }
        };
        Ok(self.settle(served))
    }

    /// Uncached: plucked lists are not memoized.
    pub async fn lists(&self, value: &str, key: Option<&str>) -> Result<Value, Error> {
        self.repository.lists(value, key).await
    }

    pub async fn create(&self, data: Record) -> Result<Record, Error> {
        self.repository.create(data).await
    }

    pub async fn update(&self, data: Record, id: &Value, attribute: &str) -> Result<u64, Error> {
        self.repository.update(data, id, attribute).await
    }

    pub async fn update_rich(&self, data: Record, id: &Value) -> Result<Record, Error> {
        self.repository.update_rich(data, id).await
    }

    pub async fn delete(&self, ids: &[Value]) -> Result<u64, Error> {
        self.repository.delete(ids).await
    }

    /// Why `method` bypasses the cache right now, if it does.
    fn bypass_reason(&self, method: &str) -> Option<&'static str> {
        if !self.config.enabled {
            Some("cache disabled")
        } else if !self.allowed_cache(method) {
            Some("method not allowed")
        } else if self.is_skipped_cache() {
            Some("bypass requested")
        } else {
            None
        }
    }

    /// Serve one read. `query` is only awaited when the cache cannot answer.
    async fn read<T, Fut>(&self, method: &'static str, args: &Value, query: Fut) -> Result<(T, CacheStatus), Error>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T, Error>>,
    {
        let identity = self.repository.identity();

        if let Some(reason) = self.bypass_reason(method) {
            tracing::debug!(repository = identity, method, reason, "cache bypassed");
            return Ok((query.await?, CacheStatus::Direct));
        }

        let key = match self.cache_key(method, args).await {
            Ok(key) => key,
            Err(e) if e.is_serialization() => {
                tracing::warn!(repository = identity, method, error = %e, "cache key unavailable, reading directly");
                return Ok((query.await?, CacheStatus::Direct));
            }
            Err(e) => return Err(e),
        };

        let (value, hit) = remember_json(self.cache.as_ref(), &key, self.cache_minutes(), move || query).await?;
        if hit {
            tracing::debug!(repository = identity, method, key = %key, "cache hit");
            Ok((value, CacheStatus::Hit))
        } else {
            tracing::debug!(repository = identity, method, key = %key, "cache miss");
            Ok((value, CacheStatus::Miss))
        }
    }

    /// Record how a read was served; cached reads end the unit of work.
    fn settle<T>(&mut self, (value, status): (T, CacheStatus)) -> T {
        if status != CacheStatus::Direct {
            self.repository.reset_scope();
        }
        self.last_status = Some(status);
        value
    }
}
