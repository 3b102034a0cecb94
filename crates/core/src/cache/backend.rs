//! The cache backend seam.

use std::future::Future;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;

/// Key/value store holding serialized read results for a bounded time.
///
/// Backends need no tag, prefix or pattern support: invalidation forgets
/// keys one by one from the key registry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` under `key` for `ttl_minutes`, replacing any previous value.
    async fn put(&self, key: &str, value: &str, ttl_minutes: u64) -> Result<(), Error>;

    /// Remove `key`. Returns whether an entry was removed.
    async fn forget(&self, key: &str) -> Result<bool, Error>;
}

/// Get-or-compute-and-store over a JSON-encoding backend.
///
/// Returns the value together with whether it came from the cache. Backend
/// errors propagate; an entry that no longer decodes into `T` is reported as
/// `Error::CorruptEntry` instead of being silently recomputed.
pub async fn remember_json<T, F, Fut>(
    backend: &dyn CacheBackend, key: &str, ttl_minutes: u64, compute: F,
) -> Result<(T, bool), Error>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    if let Some(cached) = backend.get(key).await? {
        let value = serde_json::from_str(&cached)
            .map_err(|e| Error::CorruptEntry { key: key.to_string(), reason: e.to_string() })?;
        return Ok((value, true));
    }

    let value = compute().await?;
    let encoded = serde_json::to_string(&value).map_err(|e| Error::Serialization(e.to_string()))?;
    backend.put(key, &encoded, ttl_minutes).await?;

    Ok((value, false))
}
