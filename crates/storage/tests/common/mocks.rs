use async_trait::async_trait;
use bytes::Bytes;
use farmgate_storage::error::{StorageError, StorageResult};
use farmgate_storage::traits::{ListEntry, ObjectStore};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

/// Flat key/value store that answers single-level listings the way an object
/// store with a "/" delimiter does.
///
/// Listings of prefixes in `failing_prefixes` return an I/O error, which lets
/// tests break one branch of the tree. Peak listing concurrency is recorded.
#[allow(dead_code)]
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    failing_prefixes: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    list_delay: Option<Duration>,
    pub list_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(keys: &[&str]) -> Self {
        let store = Self::new();
        for key in keys {
            store.insert(key);
        }
        store
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn insert(&self, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(b"x"));
    }

    pub fn fail_listing(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn level(&self, prefix: &str) -> Vec<ListEntry> {
        let dir = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };
        let objects = self.objects.lock().unwrap();
        let mut folders = BTreeSet::new();
        let mut entries = Vec::new();
        for (key, data) in objects.iter() {
            let Some(rest) = key.strip_prefix(&dir) else {
                continue;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    folders.insert(folder.to_string());
                }
                None => entries.push(ListEntry::file(rest, key.clone(), data.len() as u64)),
            }
        }
        entries.extend(folders.into_iter().map(ListEntry::folder));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Io(std::io::Error::other("injected delete failure")));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list_dir(&self, prefix: &str, limit: usize) -> StorageResult<Vec<ListEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failing_prefixes.lock().unwrap().contains(prefix) {
            Err(StorageError::Io(std::io::Error::other(format!(
                "injected listing failure for {prefix}"
            ))))
        } else {
            let mut entries = self.level(prefix);
            entries.truncate(limit);
            Ok(entries)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
