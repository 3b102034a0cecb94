//! Unified error types for repocache.
//!
//! Display strings carry an upper-case code prefix so log lines can be
//! grouped by failure class without parsing the message.

use tokio_rusqlite::rusqlite;

/// Unified error type shared by the cache, registry and repository layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Call arguments or active criteria could not be turned into a stable fingerprint.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Cache backend unavailable or refused the operation.
    #[error("CACHE_ERROR: {0}")]
    Backend(String),

    /// A cached value exists but no longer decodes into the requested type.
    #[error("CACHE_ERROR: corrupt entry for key {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// The persisted key registry document could not be decoded.
    #[error("REGISTRY_ERROR: {0}")]
    RegistryCorrupt(String),

    /// Durable document storage failed.
    #[error("STORAGE_ERROR: {0}")]
    Storage(#[from] std::io::Error),

    /// The record store failed to execute a query.
    #[error("STORE_ERROR: {0}")]
    Store(String),

    /// A record addressed by identifier does not exist.
    #[error("STORE_ERROR: record not found: {0}")]
    RecordNotFound(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means "no stable fingerprint for this call".
    ///
    /// Callers treat these as "caching unavailable" and fall back to direct
    /// execution; every other class is surfaced.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Error::Serialization(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
