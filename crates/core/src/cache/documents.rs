//! Whole-document storage inside the cache database.
//!
//! Lets the key registry live next to the entries it indexes. A single
//! upsert statement replaces the document, so readers never observe a
//! partial write.

use super::connection::CacheDb;
use crate::Error;
use crate::registry::DocumentStore;
use async_trait::async_trait;
use tokio_rusqlite::{params, rusqlite};

#[async_trait]
impl DocumentStore for CacheDb {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = path.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let result = conn.query_row("SELECT body FROM documents WHERE path = ?1", params![path], |row| {
                    row.get(0)
                });
                match result {
                    Ok(body) => Ok(Some(body)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn write_document(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        let path = path.to_string();
        let body = bytes.to_vec();
        let updated_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents (path, body, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                    params![path, body, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
