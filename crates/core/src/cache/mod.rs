//! Cache backends for repository read results.
//!
//! This module provides the backend seam used by the read-through decorator
//! and two implementations:
//!
//! - `CacheDb`: persistent SQLite store via tokio-rusqlite, with TTL rows,
//!   automatic schema migrations and WAL mode
//! - `MemoryCache`: in-process map with the same TTL semantics

pub mod backend;
pub mod connection;
pub mod documents;
pub mod entries;
pub mod memory;
pub mod migrations;

pub use crate::Error;

pub use backend::{CacheBackend, remember_json};
pub use connection::CacheDb;
pub use memory::MemoryCache;
