//! End-to-end behaviour of cached repositories, invalidation and the key registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use repocache_core::{
    CacheBackend, CacheConfig, DocumentStore, Error, KeyRegistry, MemoryCache, MemoryDocumentStore, RequestContext,
};
use repocache_repository::cached::key::fingerprint_call;
use repocache_repository::criteria::{Closure, WhereEquals};
use repocache_repository::{
    CacheStatus, CachedRepository, Condition, CriteriaChain, InvalidationHandler, KeyDeriver, MemoryStore, Operator,
    Page, PageMode, Query, Record, RecordStore, Repository,
};
use serde_json::{Value, json};

const REGISTRY_PATH: &str = "repository-cache-keys.json";

/// Counts every read that reaches the underlying store.
struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
}

impl CountingStore {
    async fn users() -> Arc<Self> {
        let inner = MemoryStore::new();
        inner
            .seed(
                "users",
                vec![
                    json!({ "name": "ada", "status": "active" }),
                    json!({ "name": "bob", "status": "inactive" }),
                    json!({ "name": "cy", "status": "active" }),
                ],
            )
            .await
            .unwrap();
        Arc::new(Self { inner, reads: AtomicUsize::new(0) })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn fetch_one(&self, query: &Query) -> Result<Option<Record>, Error> {
        self.count();
        self.inner.fetch_one(query).await
    }

    async fn fetch_many(&self, query: &Query) -> Result<Vec<Record>, Error> {
        self.count();
        self.inner.fetch_many(query).await
    }

    async fn fetch_page(&self, query: &Query, per_page: usize, page: usize, mode: PageMode) -> Result<Page, Error> {
        self.count();
        self.inner.fetch_page(query, per_page, page, mode).await
    }

    async fn insert(&self, entity: &str, data: Record) -> Result<Record, Error> {
        self.inner.insert(entity, data).await
    }

    async fn update_where(&self, query: &Query, data: &Record) -> Result<u64, Error> {
        self.inner.update_where(query, data).await
    }

    async fn delete_where(&self, query: &Query) -> Result<u64, Error> {
        self.inner.delete_where(query).await
    }
}

struct Harness {
    store: Arc<CountingStore>,
    documents: Arc<MemoryDocumentStore>,
    registry: Arc<KeyRegistry>,
    cache: Arc<MemoryCache>,
    repo: CachedRepository<CountingStore>,
}

async fn harness() -> Harness {
    let store = CountingStore::users().await;
    let documents = Arc::new(MemoryDocumentStore::new());
    let registry = Arc::new(KeyRegistry::new(documents.clone(), REGISTRY_PATH));
    let cache = Arc::new(MemoryCache::new());
    let config = CacheConfig::default();

    let repository = Repository::new("UserRepository", "users", store.clone());
    repository.bus().subscribe(Arc::new(InvalidationHandler::new(
        cache.clone(),
        registry.clone(),
        config.clean.clone(),
    )));

    let repo = CachedRepository::new(repository, cache.clone(), KeyDeriver::new(registry.clone()), config);
    Harness { store, documents, registry, cache, repo }
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

#[test]
fn test_same_kind_push_replaces_and_changes_fingerprint() {
    let mut chain = CriteriaChain::new();
    chain.push(WhereEquals::new("status", "active"));
    let f1 = fingerprint_call("UserRepo", "all", &json!([["*"]]), &chain, None).unwrap();
    assert_eq!(f1, fingerprint_call("UserRepo", "all", &json!([["*"]]), &chain, None).unwrap());

    chain.push(WhereEquals::new("status", "inactive"));
    let f2 = fingerprint_call("UserRepo", "all", &json!([["*"]]), &chain, None).unwrap();

    assert_ne!(f1, f2);
    assert_eq!(chain.len(), 1);
}

#[tokio::test]
async fn test_read_through_executes_once() {
    let mut h = harness().await;

    let first = h.repo.all(&["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 1);
    assert_eq!(h.repo.last_status(), Some(CacheStatus::Miss));

    let second = h.repo.all(&["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 1);
    assert_eq!(h.repo.last_status(), Some(CacheStatus::Hit));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_every_cached_read_is_memoized() {
    let mut h = harness().await;

    for _ in 0..2 {
        h.repo.find(&json!(1), &["*"]).await.unwrap();
        h.repo.find_by_field("status", &json!("active"), &["name"]).await.unwrap();
        h.repo
            .find_where(&[Condition::compare("name", Operator::Like, "%y")], &["*"], false)
            .await
            .unwrap();
        h.repo.paginate(2, 1, &["*"], PageMode::Simple).await.unwrap();
        h.repo.get_by_criteria(&WhereEquals::new("name", "bob")).await.unwrap();
    }

    assert_eq!(h.store.reads(), 5);
    assert_eq!(h.registry.get_keys("UserRepository").await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_create_invalidates_cached_reads() {
    let mut h = harness().await;
    h.repo.all(&["*"]).await.unwrap();
    h.repo.find(&json!(1), &["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 2);

    let keys = h.registry.get_keys("UserRepository").await.unwrap();
    assert_eq!(keys.len(), 2);

    h.repo.create(record(json!({ "name": "dee", "status": "active" }))).await.unwrap();
    for key in &keys {
        assert!(h.cache.get(key).await.unwrap().is_none(), "{key} still cached");
    }

    let after = h.repo.all(&["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 3);
    assert_eq!(after.len(), 4);
    assert_eq!(h.registry.get_keys("UserRepository").await.unwrap(), keys);
}

#[tokio::test]
async fn test_update_and_delete_invalidate() {
    let mut h = harness().await;

    h.repo.all(&["*"]).await.unwrap();
    h.repo.update(record(json!({ "status": "inactive" })), &json!(1), "id").await.unwrap();
    let updated = h.repo.all(&["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 2);
    assert_eq!(updated[0]["status"], "inactive");

    h.repo.delete(&[json!(2)]).await.unwrap();
    assert_eq!(h.repo.all(&["*"]).await.unwrap().len(), 2);
    assert_eq!(h.store.reads(), 3);
}

#[tokio::test]
async fn test_bypass_param_is_direct_and_registers_nothing() {
    let mut h = harness().await;
    h.repo
        .set_request(Some(RequestContext::from_url("https://app.test/users?skipCache=1").unwrap()));

    h.repo.all(&["*"]).await.unwrap();
    h.repo.all(&["*"]).await.unwrap();

    assert_eq!(h.store.reads(), 2);
    assert_eq!(h.repo.last_status(), Some(CacheStatus::Direct));
    assert!(h.registry.groups().await.unwrap().is_empty());
    assert_eq!(h.documents.write_count(), 0);
    assert!(h.cache.is_empty().await);
}

#[tokio::test]
async fn test_request_url_separates_keys() {
    let mut h = harness().await;

    h.repo.set_request(Some(RequestContext::from_url("https://app.test/users?page=1").unwrap()));
    h.repo.all(&["*"]).await.unwrap();
    h.repo.set_request(Some(RequestContext::from_url("https://app.test/users?page=2").unwrap()));
    h.repo.all(&["*"]).await.unwrap();

    assert_eq!(h.store.reads(), 2);
    assert_eq!(h.registry.get_keys("UserRepository").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let mut h = harness().await;
    h.repo.all(&["*"]).await.unwrap();
    h.repo.find(&json!(3), &["*"]).await.unwrap();
    let keys = h.registry.get_keys("UserRepository").await.unwrap();

    let restarted = KeyRegistry::new(h.documents.clone(), REGISTRY_PATH);
    assert_eq!(restarted.get_keys("UserRepository").await.unwrap(), keys);

    let body = h.documents.read_document(REGISTRY_PATH).await.unwrap().unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["UserRepository"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_opaque_criterion_falls_back_to_direct() {
    let mut h = harness().await;
    h.repo.push_criteria(Closure::new("active_only", |q, _| q.filter("status", Operator::Eq, "active")));

    let first = h.repo.all(&["*"]).await.unwrap();
    let second = h.repo.all(&["*"]).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(h.store.reads(), 2);
    assert_eq!(h.repo.last_status(), Some(CacheStatus::Direct));
    assert!(h.registry.groups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_structural_criterion_is_cached() {
    let mut h = harness().await;
    h.repo.push_criteria(
        Closure::new("with_status", |q, _| q.filter("status", Operator::Eq, "active")).property("status", "active"),
    );

    h.repo.all(&["*"]).await.unwrap();
    h.repo.all(&["*"]).await.unwrap();
    assert_eq!(h.store.reads(), 1);
}

struct FailingCache;

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        Err(Error::Backend("connection refused".into()))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl_minutes: u64) -> Result<(), Error> {
        Err(Error::Backend("connection refused".into()))
    }

    async fn forget(&self, _key: &str) -> Result<bool, Error> {
        Err(Error::Backend("connection refused".into()))
    }
}

#[tokio::test]
async fn test_backend_failure_on_read_propagates() {
    let store = CountingStore::users().await;
    let registry = Arc::new(KeyRegistry::new(Arc::new(MemoryDocumentStore::new()), REGISTRY_PATH));
    let mut repo = CachedRepository::new(
        Repository::new("UserRepository", "users", store.clone()),
        Arc::new(FailingCache),
        KeyDeriver::new(registry),
        CacheConfig::default(),
    );

    let result = repo.all(&["*"]).await;
    assert!(matches!(result, Err(Error::Backend(_))));
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn test_backend_failure_on_eviction_does_not_fail_write() {
    let store = CountingStore::users().await;
    let registry = Arc::new(KeyRegistry::new(Arc::new(MemoryDocumentStore::new()), REGISTRY_PATH));
    registry.put_key("UserRepository", "UserRepository@all-stale").await.unwrap();

    let repository = Repository::new("UserRepository", "users", store.clone());
    repository.bus().subscribe(Arc::new(InvalidationHandler::new(
        Arc::new(FailingCache),
        registry,
        CacheConfig::default().clean,
    )));

    let created = repository.create(record(json!({ "name": "eve" }))).await.unwrap();
    assert_eq!(created["id"], 4);
}

#[tokio::test]
async fn test_corrupt_cached_entry_is_reported() {
    let mut h = harness().await;
    let key = h.repo.cache_key("all", &json!([["*"]])).await.unwrap();
    h.cache.put(&key, "{not json", 30).await.unwrap();

    let result = h.repo.all(&["*"]).await;
    assert!(matches!(result, Err(Error::CorruptEntry { .. })));
}
