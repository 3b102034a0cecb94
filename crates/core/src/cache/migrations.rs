//! Database schema migrations.
//!
//! Applied migrations are recorded in `_migrations`; each pending one runs
//! inside its own transaction together with its bookkeeping row.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version. Every script uses `IF NOT EXISTS`.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "cache_entries", sql: include_str!("../../migrations/001_cache_entries.sql") },
    Migration { version: 2, name: "documents", sql: include_str!("../../migrations/002_documents.sql") },
];

/// Highest schema version this build knows about.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Run any pending migrations.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the script that failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current = current_version(conn)?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|e| Error::MigrationFailed(format!("{:03}_{}: {e}", migration.version, migration.name)))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version = migration.version, name = migration.name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;
    Ok(version)
}
