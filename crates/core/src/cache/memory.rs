//! In-process cache backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::backend::CacheBackend;
use crate::Error;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-local cache with the same TTL semantics as `CacheDb`.
///
/// A TTL too large to represent never expires.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl_minutes: u64) -> Result<(), Error> {
        let expires_at = i64::try_from(ttl_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}
