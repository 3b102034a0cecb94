//! SQLite-backed cache entries.
//!
//! Rows carry an absolute `expires_at`; reads ignore expired rows and
//! `purge_expired` reclaims them. Timestamps are compared as RFC 3339 text,
//! which only orders correctly for four-digit years, so expiries are capped
//! at the end of year 9999.

use super::backend::CacheBackend;
use super::connection::CacheDb;
use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio_rusqlite::{params, rusqlite};

#[async_trait]
impl CacheBackend for CacheDb {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare("SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2")?;

                match stmt.query_row(params![key, now], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &str, value: &str, ttl_minutes: u64) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();

        let stored_at = Utc::now();
        let expires_at = expiry_after(stored_at, ttl_minutes).to_rfc3339();
        let stored_at = stored_at.to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (key, value, stored_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![key, value, stored_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn forget(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }
}

/// Latest expiry that still sorts correctly as RFC 3339 text.
fn latest_expiry() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|day| day.and_hms_opt(23, 59, 59))
        .map_or(DateTime::<Utc>::MAX_UTC, |at| at.and_utc())
}

/// `stored_at + ttl_minutes`, capped at `latest_expiry()`.
fn expiry_after(stored_at: DateTime<Utc>, ttl_minutes: u64) -> DateTime<Utc> {
    let latest = latest_expiry();
    i64::try_from(ttl_minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .and_then(|ttl| stored_at.checked_add_signed(ttl))
        .map_or(latest, |at| at.min(latest))
}

impl CacheDb {
    /// Delete expired cache entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored entries, live or expired.
    pub async fn count_entries(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Backdate an entry so it reads as expired.
    #[cfg(test)]
    pub(crate) async fn expire_now(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        let past = (Utc::now() - Duration::minutes(1)).to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("UPDATE cache_entries SET expires_at = ?1 WHERE key = ?2", params![past, key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
