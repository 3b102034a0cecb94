//! Persisted index of every cache key issued per repository.
//!
//! Cache backends are plain key/value stores, so invalidating "everything
//! cached for `UserRepository`" needs a list of those keys. The registry
//! keeps that list in one JSON document:
//!
//! ```json
//! { "UserRepository": ["UserRepository@all-3f9a...", "UserRepository@find-77c1..."] }
//! ```
//!
//! The document is loaded lazily on first access and kept in memory. Every
//! new key rewrites the whole document before `put_key` returns, so another
//! process reading storage afterwards sees the key. Keys are never removed:
//! a later sweep must still reach combinations not seen since the last one.

pub mod store;

pub use store::{DocumentStore, FileDocumentStore, MemoryDocumentStore};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::Error;
use crate::cache::CacheDb;
use crate::config::{AppConfig, RegistryConfig, RegistryStoreKind};

type KeyMap = BTreeMap<String, BTreeSet<String>>;

/// Registry of cache keys grouped by repository identity.
///
/// Construct one per process and share it behind an `Arc`. Writes are
/// serialized by an internal lock held across the document rewrite; there
/// is no cross-process locking beyond the store's atomic replace.
pub struct KeyRegistry {
    store: Arc<dyn DocumentStore>,
    path: String,
    keys: Mutex<Option<KeyMap>>,
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry").field("path", &self.path).finish_non_exhaustive()
    }
}

impl KeyRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, path: impl Into<String>) -> Self {
        Self { store, path: path.into(), keys: Mutex::new(None) }
    }

    /// File-backed registry at `config.dir/config.file`.
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(Arc::new(FileDocumentStore::new(&config.dir)), config.file.clone())
    }

    /// Registry over whichever store `registry.store` selects.
    ///
    /// The sqlite store keeps the document in the cache database at
    /// `cache.db_path`, under the name `registry.file`.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        match config.registry.store {
            RegistryStoreKind::File => Ok(Self::from_config(&config.registry)),
            RegistryStoreKind::Sqlite => {
                let db = CacheDb::open(&config.cache.db_path).await?;
                Ok(Self::new(Arc::new(db), config.registry.file.clone()))
            }
        }
    }

    /// Name of the registry document inside its store.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Record `key` under `group`.
    ///
    /// Idempotent: a known key changes nothing and writes nothing. A new key
    /// is persisted before the in-memory view is allowed to keep it.
    /// Returns whether the key was new.
    pub async fn put_key(&self, group: &str, key: &str) -> Result<bool, Error> {
        let mut slot = self.keys.lock().await;
        let keys = self.ensure_loaded(&mut slot).await?;

        let group_keys = keys.entry(group.to_string()).or_default();
        if !group_keys.insert(key.to_string()) {
            return Ok(false);
        }

        if let Err(e) = self.persist(keys).await {
            if let Some(group_keys) = keys.get_mut(group) {
                group_keys.remove(key);
                if group_keys.is_empty() {
                    keys.remove(group);
                }
            }
            return Err(e);
        }

        tracing::debug!(repository = group, key, "registered cache key");
        Ok(true)
    }

    /// Every key recorded for `group`, sorted. Unknown groups yield an empty list.
    ///
    /// # Errors
    ///
    /// Fails only when the lazy load of the document fails.
    pub async fn get_keys(&self, group: &str) -> Result<Vec<String>, Error> {
        let mut slot = self.keys.lock().await;
        let keys = self.ensure_loaded(&mut slot).await?;
        Ok(keys.get(group).map(|set| set.iter().cloned().collect()).unwrap_or_default())
    }

    /// Every repository identity with at least one key.
    pub async fn groups(&self) -> Result<Vec<String>, Error> {
        let mut slot = self.keys.lock().await;
        let keys = self.ensure_loaded(&mut slot).await?;
        Ok(keys.keys().cloned().collect())
    }

    /// Forget the in-memory view; the next access reads storage again.
    pub async fn reload(&self) {
        *self.keys.lock().await = None;
    }

    async fn ensure_loaded<'a>(&self, slot: &'a mut Option<KeyMap>) -> Result<&'a mut KeyMap, Error> {
        if slot.is_none() {
            let loaded = self.load().await?;
            tracing::debug!(path = %self.path, groups = loaded.len(), "loaded key registry");
            *slot = Some(loaded);
        }
        Ok(slot.get_or_insert_with(KeyMap::new))
    }

    async fn load(&self) -> Result<KeyMap, Error> {
        let Some(bytes) = self.store.read_document(&self.path).await? else {
            return Ok(KeyMap::new());
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(KeyMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| Error::RegistryCorrupt(format!("{}: {e}", self.path)))
    }

    async fn persist(&self, keys: &KeyMap) -> Result<(), Error> {
        let body = serde_json::to_vec(keys).map_err(|e| Error::Serialization(e.to_string()))?;
        self.store.write_document(&self.path, &body).await
    }
}
