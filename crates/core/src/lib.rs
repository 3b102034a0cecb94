//! Core types and shared functionality for repocache.
//!
//! This crate provides:
//! - Cache backends (SQLite and in-memory) behind the `CacheBackend` seam
//! - The persisted key registry that drives invalidation
//! - Deterministic fingerprint hashing and the ambient request context
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod registry;

pub use cache::{CacheBackend, CacheDb, MemoryCache, remember_json};
pub use config::{AppConfig, CacheConfig, CleanConfig, ConfigError};
pub use context::RequestContext;
pub use error::Error;
pub use registry::{DocumentStore, FileDocumentStore, KeyRegistry, MemoryDocumentStore};
