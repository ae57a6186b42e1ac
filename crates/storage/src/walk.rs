//! Recursive bucket enumeration built on single-level listings.
//!
//! Listing is best effort: a directory that fails to list is logged, recorded
//! in the report, and contributes no files, while the rest of the tree is
//! still walked. Callers decide whether a partial listing is good enough.

use crate::error::StorageError;
use crate::traits::ObjectStore;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Tuning for [`list_all_files`].
#[derive(Clone, Copy, Debug)]
pub struct WalkOptions {
    /// Maximum entries requested per directory.
    pub limit: usize,
    /// Sibling directories listed concurrently.
    pub concurrency: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            limit: farmgate_core::DEFAULT_LISTING_LIMIT,
            concurrency: 4,
        }
    }
}

/// A directory whose listing failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingFailure {
    pub prefix: String,
    /// Stable error class, see [`StorageError::kind`].
    pub kind: &'static str,
    pub message: String,
}

impl ListingFailure {
    fn new(prefix: String, err: &StorageError) -> Self {
        Self {
            prefix,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of walking a bucket.
#[derive(Clone, Debug, Default)]
pub struct WalkReport {
    /// Bucket-relative file paths. No duplicates, no ordering guarantee.
    pub files: Vec<String>,
    /// Directories that could not be listed.
    pub failures: Vec<ListingFailure>,
    /// Directories that returned a full page; entries past the page were not seen.
    pub truncated: Vec<String>,
}

impl WalkReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.truncated.is_empty()
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Enumerate every file under `prefix` by descending into folders.
///
/// Returned paths are relative to the bucket root: `name` at the root,
/// `dir/sub/name` below it.
pub async fn list_all_files(
    store: &dyn ObjectStore,
    prefix: &str,
    options: &WalkOptions,
) -> WalkReport {
    let limit = options.limit.max(1);
    let concurrency = options.concurrency.max(1);

    let root = prefix.trim_matches('/').to_string();
    let mut pending = VecDeque::from([root.clone()]);
    let mut visited = HashSet::from([root]);
    let mut seen_files = HashSet::new();
    let mut in_flight = FuturesUnordered::new();
    let mut report = WalkReport::default();

    loop {
        while in_flight.len() < concurrency {
            let Some(dir) = pending.pop_front() else {
                break;
            };
            in_flight.push(async move {
                let result = store.list_dir(&dir, limit).await;
                (dir, result)
            });
        }

        let Some((dir, result)) = in_flight.next().await else {
            break;
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    backend = store.backend_name(),
                    prefix = %dir,
                    error = %e,
                    "Failed to list directory, skipping"
                );
                report.failures.push(ListingFailure::new(dir, &e));
                continue;
            }
        };

        if entries.len() >= limit {
            warn!(
                backend = store.backend_name(),
                prefix = %dir,
                limit,
                "Directory listing hit the per-level limit, results may be incomplete"
            );
            report.truncated.push(dir.clone());
        }

        for entry in entries {
            let path = join_path(&dir, &entry.name);
            if entry.is_folder() {
                if visited.insert(path.clone()) {
                    pending.push_back(path);
                }
            } else if seen_files.insert(path.clone()) {
                report.files.push(path);
            }
        }
    }

    debug!(
        backend = store.backend_name(),
        files = report.files.len(),
        failures = report.failures.len(),
        truncated = report.truncated.len(),
        "Bucket walk finished"
    );

    report
}
