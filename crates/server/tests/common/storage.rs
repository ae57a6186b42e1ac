//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use farmgate_storage::{FilesystemBackend, ListEntry, ObjectStore, StorageError, StorageResult};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Filesystem bucket with injectable faults.
///
/// Listing a prefix in `failing_listings` or deleting a key in
/// `failing_deletes` returns an I/O error; everything else goes to disk.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FlakyStore {
    inner: FilesystemBackend,
    failing_listings: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    list_delay: Mutex<Option<Duration>>,
    pub delete_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyStore {
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self {
            inner: FilesystemBackend::new(root).await?,
            failing_listings: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            list_delay: Mutex::new(None),
            delete_calls: AtomicUsize::new(0),
        })
    }

    /// Store a small placeholder object at each key.
    pub async fn seed(&self, keys: &[&str]) {
        for key in keys {
            self.inner
                .put(key, Bytes::from_static(b"\xff\xd8\xff\xe0seed"))
                .await
                .expect("Failed to seed object");
        }
    }

    pub fn fail_listing(&self, prefix: &str) {
        self.failing_listings
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn slow_listings(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.exists(key).await.expect("exists failed")
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected delete failure",
            )));
        }
        self.inner.delete(key).await
    }

    async fn list_dir(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ListEntry>> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_listings.lock().unwrap().contains(prefix) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "injected listing failure for {prefix}"
            ))));
        }
        self.inner.list_dir(prefix, limit).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
