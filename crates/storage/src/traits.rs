//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// One entry of a single-level directory listing.
///
/// Folders are entries without an `id`; they must be listed again to reach the
/// files underneath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    /// Name relative to the listed prefix (no slashes).
    pub name: String,
    /// Backend object identifier. Present for files, absent for folders.
    pub id: Option<String>,
    /// Object size in bytes, 0 for folders.
    pub size: u64,
}

impl ListEntry {
    pub fn file(name: impl Into<String>, id: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            id: Some(id.into()),
            size,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            size: 0,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.id.is_none()
    }
}

/// Object store abstraction for one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Returns `StorageError::NotFound` if the key is absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List one directory level under `prefix`, returning at most `limit`
    /// entries. An empty prefix lists the bucket root. A prefix that does not
    /// exist lists as empty.
    async fn list_dir(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ListEntry>>;

    /// Static identifier for the backend type ("s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during startup so a misconfigured bucket fails fast.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
