//! Durable document storage for the key registry.
//!
//! The registry rewrites its whole document on every change, so a store only
//! has to read and atomically replace one blob by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;

/// Whole-document read / atomic replace.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the document, or `None` if it was never written.
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Replace the document. Readers see either the old or the new bytes.
    async fn write_document(&self, path: &str, bytes: &[u8]) -> Result<(), Error>;
}

/// Documents as files under a root directory.
///
/// Writes go to a temporary sibling which is fsynced and renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(path);
        if relative.is_absolute() || relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(Error::InvalidInput(format!("document path must stay inside the store root: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(format!(".tmp-{}", std::process::id()));
        let tmp = target.with_file_name(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Process-local document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_document` calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read_document(&self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.documents.lock().await.get(path).cloned())
    }

    async fn write_document(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        self.documents.lock().await.insert(path.to_string(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
