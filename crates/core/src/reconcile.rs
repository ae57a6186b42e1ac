//! Orphan-file reconciliation.
//!
//! Diffs the paths enumerated from a storage bucket against the values held in
//! the database, in both directions:
//!
//! - **orphan files**: stored objects that no reference points at
//! - **dangling references**: references whose object is missing from the bucket
//!
//! The listing and the database query are not taken from one snapshot, so the
//! result is a point-in-time approximation. Callers re-run before acting on it
//! at scale.
//!
//! "Points at" is substring containment: a path is used when any reference
//! value contains it. Reference values are usually full public URLs that end
//! with the storage path, so plain equality would never match. Containment also
//! means a short path can be shadowed by a longer, unrelated URL; that is the
//! accepted precision of the heuristic and is kept as is.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// A database value expected to point into a bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceRecord {
    /// Primary key of the owning row.
    pub id: String,
    /// The stored URL or path.
    pub value: String,
}

impl ReferenceRecord {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Rules applied while reconciling one bucket.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    /// Bucket name, used to locate the storage path inside a reference URL.
    pub bucket: String,
    /// Storage paths under these prefixes are never orphans.
    pub excluded_path_prefixes: Vec<String>,
    /// References containing any of these hosts are ignored entirely.
    pub external_hosts: Vec<String>,
}

impl ReconcileOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_excluded_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_path_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_external_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a reference value is hosted outside our storage (social login avatars).
    pub fn is_external(&self, value: &str) -> bool {
        self.external_hosts
            .iter()
            .any(|host| !host.is_empty() && value.contains(host.as_str()))
    }

    /// Whether a storage path lives in a reserved namespace.
    pub fn is_reserved(&self, path: &str) -> bool {
        self.excluded_path_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    /// Extract the bucket-relative storage path from a reference value.
    ///
    /// - `https://host/.../<bucket>/a/b.jpg?t=1` yields `a/b.jpg`
    /// - `<bucket>/a/b.jpg` yields `a/b.jpg`
    /// - a bare relative value such as `a/b.jpg` is taken as the path itself
    /// - an absolute URL without the bucket segment yields `None`
    ///
    /// The returned slice always borrows from `value`.
    pub fn extract_path<'a>(&self, value: &'a str) -> Option<&'a str> {
        let value = value.trim();
        let marker = format!("/{}/", self.bucket);

        let rest = if let Some(idx) = value.find(&marker) {
            &value[idx + marker.len()..]
        } else if let Some(rest) = value.strip_prefix(&marker[1..]) {
            rest
        } else if !value.contains("://") {
            value.trim_start_matches('/')
        } else {
            return None;
        };

        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let path = &rest[..end];
        (!path.is_empty()).then_some(path)
    }
}

/// Tallies reported alongside a reconciliation result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    /// Distinct storage paths examined.
    pub storage_files: usize,
    /// Reference records received.
    pub references: usize,
    /// Reference records skipped as externally hosted.
    pub excluded_references: usize,
    pub orphans: usize,
    pub dangling: usize,
}

/// Output of [`reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrphanResult {
    /// Unreferenced storage paths, sorted and de-duplicated.
    pub orphan_files: Vec<String>,
    /// Records whose storage object is missing, in input order.
    pub dangling_references: Vec<ReferenceRecord>,
    pub counts: ReconcileCounts,
}

/// Diff a bucket listing against the references held in the database.
///
/// Pure: no I/O, no logging.
pub fn reconcile(
    storage_paths: &[String],
    references: &[ReferenceRecord],
    options: &ReconcileOptions,
) -> OrphanResult {
    let considered: Vec<&ReferenceRecord> = references
        .iter()
        .filter(|record| !options.is_external(&record.value))
        .collect();
    let excluded_references = references.len() - considered.len();

    // Every extracted path is a slice of its reference value, so an exact hit
    // here already satisfies the containment test below.
    let extracted: HashSet<&str> = considered
        .iter()
        .filter_map(|record| options.extract_path(&record.value))
        .collect();

    let storage: HashSet<&str> = storage_paths.iter().map(String::as_str).collect();

    let orphan_files: Vec<String> = storage
        .iter()
        .copied()
        .filter(|path| !options.is_reserved(path))
        .filter(|path| {
            !extracted.contains(path)
                && !considered
                    .iter()
                    .any(|record| record.value.contains(*path))
        })
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let dangling_references: Vec<ReferenceRecord> = considered
        .iter()
        .filter(|record| match options.extract_path(&record.value) {
            Some(path) => !options.is_reserved(path) && !storage.contains(path),
            None => false,
        })
        .map(|record| (*record).clone())
        .collect();

    let counts = ReconcileCounts {
        storage_files: storage.len(),
        references: references.len(),
        excluded_references,
        orphans: orphan_files.len(),
        dangling: dangling_references.len(),
    };

    OrphanResult {
        orphan_files,
        dangling_references,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor_options() -> ReconcileOptions {
        ReconcileOptions::new("visitor-photos")
            .with_excluded_prefixes(["systems/"])
            .with_external_hosts(["googleusercontent.com", "kakaocdn.net"])
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reserved_prefix_and_substring_match() {
        let storage = paths(&["f1.jpg", "sub/f2.jpg", "systems/f3.jpg"]);
        let refs = vec![ReferenceRecord::new(
            "1",
            "https://host/visitor-photos/f1.jpg",
        )];

        let result = reconcile(&storage, &refs, &visitor_options());

        assert_eq!(result.orphan_files, vec!["sub/f2.jpg".to_string()]);
        assert!(result.dangling_references.is_empty());
        assert_eq!(result.counts.storage_files, 3);
        assert_eq!(result.counts.orphans, 1);
    }

    #[test]
    fn test_missing_object_is_dangling() {
        let storage = paths(&["f1.jpg"]);
        let refs = vec![
            ReferenceRecord::new("a", "https://host/visitor-photos/f1.jpg"),
            ReferenceRecord::new("b", "https://host/visitor-photos/missing.jpg"),
        ];

        let result = reconcile(&storage, &refs, &visitor_options());

        assert_eq!(
            result.dangling_references,
            vec![ReferenceRecord::new(
                "b",
                "https://host/visitor-photos/missing.jpg"
            )]
        );
        assert!(result.orphan_files.is_empty());
    }

    #[test]
    fn test_external_avatar_is_ignored_both_ways() {
        let storage = paths(&["abc"]);
        let refs = vec![
            ReferenceRecord::new("g", "https://lh3.googleusercontent.com/abc"),
            ReferenceRecord::new("k", "http://k.kakaocdn.net/dn/abc/img.jpg"),
        ];

        let result = reconcile(&storage, &refs, &visitor_options());

        // "abc" would be a substring match if the external URL counted as used.
        assert_eq!(result.orphan_files, vec!["abc".to_string()]);
        assert!(result.dangling_references.is_empty());
        assert_eq!(result.counts.excluded_references, 2);
    }

    #[test]
    fn test_unreferenced_paths_are_all_orphans() {
        let storage = paths(&["a/1.jpg", "a/2.jpg", "b/3.png", "4.webp", "systems/logo.png"]);
        let refs = vec![
            ReferenceRecord::new("1", "https://cdn/visitor-photos/a/1.jpg"),
            ReferenceRecord::new("2", "https://lh3.googleusercontent.com/b/3.png"),
        ];
        let options = visitor_options();

        let result = reconcile(&storage, &refs, &options);

        for path in &storage {
            let used = refs
                .iter()
                .filter(|r| !options.is_external(&r.value))
                .any(|r| r.value.contains(path.as_str()));
            let expected = !used && !options.is_reserved(path);
            assert_eq!(
                result.orphan_files.contains(path),
                expected,
                "unexpected classification for {path}"
            );
        }
    }

    #[test]
    fn test_reserved_prefix_wins_over_missing_reference() {
        let storage = paths(&["systems/logo.png", "systems/nested/banner.png"]);
        let result = reconcile(&storage, &[], &visitor_options());
        assert!(result.orphan_files.is_empty());
    }

    #[test]
    fn test_reserved_reference_is_never_dangling() {
        let refs = vec![ReferenceRecord::new(
            "1",
            "https://host/visitor-photos/systems/logo.png",
        )];
        let result = reconcile(&[], &refs, &visitor_options());
        assert!(result.dangling_references.is_empty());
    }

    #[test]
    fn test_substring_containment_is_preserved() {
        // "f2.jpg" is not the referenced object, but it is contained in the URL.
        let storage = paths(&["f2.jpg", "sub/f2.jpg"]);
        let refs = vec![ReferenceRecord::new(
            "1",
            "https://host/visitor-photos/sub/f2.jpg",
        )];

        let result = reconcile(&storage, &refs, &visitor_options());

        assert!(result.orphan_files.is_empty());
    }

    #[test]
    fn test_query_string_does_not_make_reference_dangling() {
        let storage = paths(&["farm/entry.jpg"]);
        let refs = vec![ReferenceRecord::new(
            "1",
            "https://host/storage/v1/object/public/visitor-photos/farm/entry.jpg?t=1700000000",
        )];

        let result = reconcile(&storage, &refs, &visitor_options());

        assert!(result.orphan_files.is_empty());
        assert!(result.dangling_references.is_empty());
    }

    #[test]
    fn test_bare_paths_are_reconciled() {
        let storage = paths(&["p/1.png"]);
        let refs = vec![
            ReferenceRecord::new("1", "p/1.png"),
            ReferenceRecord::new("2", "visitor-photos/p/2.png"),
        ];

        let result = reconcile(&storage, &refs, &visitor_options());

        assert!(result.orphan_files.is_empty());
        assert_eq!(result.dangling_references.len(), 1);
        assert_eq!(result.dangling_references[0].id, "2");
    }

    #[test]
    fn test_url_into_other_bucket_is_not_dangling() {
        let refs = vec![ReferenceRecord::new(
            "1",
            "https://host/storage/v1/object/public/profiles/me.png",
        )];
        let result = reconcile(&[], &refs, &visitor_options());
        assert!(result.dangling_references.is_empty());
    }

    #[test]
    fn test_bucket_name_must_be_a_whole_segment() {
        let options = visitor_options();
        assert_eq!(
            options.extract_path("https://host/old-visitor-photos/a.jpg"),
            None
        );
        assert_eq!(
            options.extract_path("https://host/visitor-photos/a.jpg#frag"),
            Some("a.jpg")
        );
        assert_eq!(options.extract_path("https://host/visitor-photos/"), None);
    }

    #[test]
    fn test_duplicate_storage_paths_are_reported_once() {
        let storage = paths(&["x.jpg", "x.jpg"]);
        let result = reconcile(&storage, &[], &visitor_options());
        assert_eq!(result.orphan_files, vec!["x.jpg".to_string()]);
        assert_eq!(result.counts.storage_files, 1);
    }

    #[test]
    fn test_empty_inputs() {
        let result = reconcile(&[], &[], &visitor_options());
        assert_eq!(result, OrphanResult::default());
    }
}
