//! Orphan-file check and cleanup runs.
//!
//! A run walks each domain in turn (visitor photos, then profile images):
//! references are read from the database, the bucket is enumerated, and the
//! two are reconciled. Database failures abort the run. Listing failures are
//! confined to the subtree that failed and reported alongside the result.
//!
//! Whole runs are bounded by `reconcile.run_timeout_secs`.

use crate::audit::{Actor, AuditEvent, create_system_log};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::{Bucket, BucketStores, reference_source};
use farmgate_core::config::ReconcileConfig;
use farmgate_core::{
    AuditAction, LogLevel, OrphanResult, ReconcileDomain, ReconcileOptions, ReferenceRecord,
    reconcile,
};
use farmgate_metadata::repos::{ReferenceRepo, SystemLogRepo};
use farmgate_metadata::{MetadataResult, ReferenceSource};
use farmgate_storage::{ObjectStore, WalkOptions, WalkReport, list_all_files};
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use std::future::Future;

/// Everything learned about one domain in a run.
#[derive(Debug)]
pub struct DomainScan {
    pub domain: ReconcileDomain,
    pub bucket: String,
    /// Every non-empty reference read from the database.
    pub references: Vec<ReferenceRecord>,
    /// Reference values that took part in matching (external hosts removed).
    pub used_urls: Vec<String>,
    pub walk: WalkReport,
    pub result: OrphanResult,
}

/// Result of a check run.
#[derive(Debug)]
pub struct OrphanCheck {
    pub visitor: DomainScan,
    pub profile: DomainScan,
}

/// Counts for one domain's deletions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    /// Objects this run removed.
    pub deleted: usize,
    /// Orphans the run attempted to remove.
    pub total: usize,
    /// Orphans already gone when deleted (a concurrent run got there first).
    pub already_missing: usize,
    pub failed: usize,
}

/// Result of a cleanup run.
#[derive(Debug)]
pub struct CleanupReport {
    pub visitor: CleanupOutcome,
    pub profile: CleanupOutcome,
}

impl CleanupReport {
    pub fn deleted(&self) -> usize {
        self.visitor.deleted + self.profile.deleted
    }

    pub fn total(&self) -> usize {
        self.visitor.total + self.profile.total
    }

    pub fn failed(&self) -> usize {
        self.visitor.failed + self.profile.failed
    }

    pub fn summary(&self) -> String {
        format!(
            "Deleted {} of {} orphan files (visitor {}/{}, profile {}/{}, failed {})",
            self.deleted(),
            self.total(),
            self.visitor.deleted,
            self.visitor.total,
            self.profile.deleted,
            self.profile.total,
            self.failed(),
        )
    }
}

/// Reconciler options for one bucket.
pub fn reconcile_options(config: &ReconcileConfig, bucket: &str) -> ReconcileOptions {
    ReconcileOptions::new(bucket)
        .with_excluded_prefixes(config.excluded_path_prefixes.iter().cloned())
        .with_external_hosts(config.external_hosts.iter().cloned())
}

/// Read the non-empty references held in one column.
pub async fn collect_references<R>(
    repo: &R,
    source: ReferenceSource,
) -> MetadataResult<Vec<ReferenceRecord>>
where
    R: ReferenceRepo + ?Sized,
{
    let rows = repo.list_references(source).await?;
    Ok(rows
        .into_iter()
        .map(|row| ReferenceRecord::new(row.record_id.to_string(), row.value))
        .collect())
}

/// Collect references, walk the bucket and reconcile one domain.
pub async fn scan_domain<R>(
    repo: &R,
    bucket: &Bucket,
    domain: ReconcileDomain,
    config: &ReconcileConfig,
) -> ApiResult<DomainScan>
where
    R: ReferenceRepo + ?Sized,
{
    let label = domain.as_str();
    let _timer = metrics::SCAN_DURATION.with_label_values(&[label]).start_timer();
    metrics::ORPHAN_SCANS.with_label_values(&[label]).inc();

    let references = collect_references(repo, reference_source(domain))
        .await
        .inspect_err(|e| {
            tracing::error!(domain = label, error = %e, "Failed to read storage references");
        })?;

    let walk = list_all_files(
        bucket.store.as_ref(),
        "",
        &WalkOptions {
            limit: config.listing_limit,
            concurrency: config.listing_concurrency,
        },
    )
    .await;

    let options = reconcile_options(config, &bucket.name);
    let result = reconcile(&walk.files, &references, &options);
    let used_urls = references
        .iter()
        .filter(|r| !options.is_external(&r.value))
        .map(|r| r.value.clone())
        .collect();

    metrics::ORPHAN_FILES_FOUND
        .with_label_values(&[label])
        .inc_by(result.counts.orphans as u64);
    metrics::DANGLING_REFERENCES_FOUND
        .with_label_values(&[label])
        .inc_by(result.counts.dangling as u64);
    metrics::LISTING_FAILURES
        .with_label_values(&[label])
        .inc_by(walk.failures.len() as u64);

    tracing::info!(
        domain = label,
        bucket = %bucket.name,
        storage_files = result.counts.storage_files,
        references = result.counts.references,
        excluded_references = result.counts.excluded_references,
        orphans = result.counts.orphans,
        dangling = result.counts.dangling,
        listing_failures = walk.failures.len(),
        truncated_prefixes = walk.truncated.len(),
        "Reconciled bucket"
    );

    Ok(DomainScan {
        domain,
        bucket: bucket.name.clone(),
        references,
        used_urls,
        walk,
        result,
    })
}

/// Delete `paths` from `store`, at most `concurrency` at a time.
///
/// A path that is already gone is counted in `already_missing`. Any other
/// failure is logged and counted; the batch always runs to the end.
pub async fn delete_orphans(
    store: &dyn ObjectStore,
    bucket: &str,
    paths: &[String],
    concurrency: usize,
) -> CleanupOutcome {
    let mut outcome = CleanupOutcome {
        total: paths.len(),
        ..CleanupOutcome::default()
    };

    let mut results = stream::iter(paths)
        .map(|path| async move { (path, store.delete(path).await) })
        .buffer_unordered(concurrency.max(1));

    while let Some((path, result)) = results.next().await {
        match result {
            Ok(()) => {
                outcome.deleted += 1;
                tracing::debug!(bucket, path = %path, "Deleted orphan file");
            }
            Err(e) if e.is_not_found() => {
                outcome.already_missing += 1;
                tracing::debug!(bucket, path = %path, "Orphan file already gone");
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(bucket, path = %path, error = %e, "Failed to delete orphan file");
            }
        }
    }

    outcome
}

async fn with_deadline<T>(
    config: &ReconcileConfig,
    run: impl Future<Output = ApiResult<T>>,
) -> ApiResult<T> {
    tokio::time::timeout(config.run_timeout(), run)
        .await
        .unwrap_or(Err(ApiError::Timeout(config.run_timeout_secs)))
}

/// Reconcile both domains without changing anything.
pub async fn run_check<R>(
    repo: &R,
    buckets: &BucketStores,
    config: &ReconcileConfig,
) -> ApiResult<OrphanCheck>
where
    R: ReferenceRepo + ?Sized,
{
    with_deadline(config, async {
        let visitor = scan_domain(repo, &buckets.visitor, ReconcileDomain::Visitor, config).await?;
        let profile = scan_domain(repo, &buckets.profile, ReconcileDomain::Profile, config).await?;
        Ok(OrphanCheck { visitor, profile })
    })
    .await
}

async fn clean_domain<R>(
    repo: &R,
    bucket: &Bucket,
    domain: ReconcileDomain,
    config: &ReconcileConfig,
) -> ApiResult<CleanupOutcome>
where
    R: ReferenceRepo + ?Sized,
{
    let scan = scan_domain(repo, bucket, domain, config).await?;
    let outcome = delete_orphans(
        bucket.store.as_ref(),
        &bucket.name,
        &scan.result.orphan_files,
        config.delete_concurrency,
    )
    .await;

    metrics::ORPHAN_FILES_DELETED
        .with_label_values(&[domain.as_str()])
        .inc_by(outcome.deleted as u64);
    metrics::ORPHAN_DELETE_FAILURES
        .with_label_values(&[domain.as_str()])
        .inc_by(outcome.failed as u64);

    Ok(outcome)
}

/// Delete the orphans of both domains and record the run in the system log.
///
/// A completed run writes `ORPHAN_FILES_CLEANUP`; a run that fails or times out
/// writes `ORPHAN_FILES_CLEANUP_FAILED` and returns the original error.
pub async fn run_cleanup<S>(
    store: &S,
    buckets: &BucketStores,
    config: &ReconcileConfig,
    actor: Actor,
) -> ApiResult<CleanupReport>
where
    S: ReferenceRepo + SystemLogRepo + ?Sized,
{
    // Set once the visitor domain is done, so a later failure can still
    // report what was deleted.
    let mut visitor_done: Option<CleanupOutcome> = None;
    let run = with_deadline(config, async {
        let visitor =
            clean_domain(store, &buckets.visitor, ReconcileDomain::Visitor, config).await?;
        visitor_done = Some(visitor);
        let profile =
            clean_domain(store, &buckets.profile, ReconcileDomain::Profile, config).await?;
        Ok(CleanupReport { visitor, profile })
    })
    .await;

    match run {
        Ok(report) => {
            let level = if report.failed() > 0 {
                LogLevel::Warn
            } else {
                LogLevel::Info
            };
            tracing::info!(
                deleted = report.deleted(),
                total = report.total(),
                failed = report.failed(),
                "Orphan cleanup finished"
            );
            create_system_log(
                store,
                AuditEvent::new(AuditAction::OrphanCleanup, level, report.summary())
                    .actor(actor)
                    .resource("storage", format!("{},{}", buckets.visitor.name, buckets.profile.name))
                    .metadata(serde_json::json!({
                        "visitor": report.visitor,
                        "profile": report.profile,
                    })),
            )
            .await?;
            Ok(report)
        }
        Err(err) => {
            tracing::error!(code = err.code(), error = %err, "Orphan cleanup failed");
            let message = match visitor_done {
                Some(visitor) => format!(
                    "Orphan cleanup failed: {} (visitor already deleted {}/{})",
                    err.code(),
                    visitor.deleted,
                    visitor.total
                ),
                None => format!("Orphan cleanup failed: {}", err.code()),
            };
            let event = AuditEvent::new(AuditAction::OrphanCleanupFailed, LogLevel::Error, message)
                .actor(actor)
                .metadata(serde_json::json!({
                    "code": err.code(),
                    "visitor": visitor_done,
                }));
            // The run's own error is what the caller needs to see.
            if let Err(audit_err) = create_system_log(store, event).await {
                tracing::error!(error = %audit_err, "Could not record failed cleanup");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmgate_storage::FilesystemBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delete_orphans_counts_missing_separately() {
        let temp = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        backend.put("a.jpg", bytes::Bytes::from_static(b"a")).await.unwrap();
        backend
            .put("sub/b.jpg", bytes::Bytes::from_static(b"b"))
            .await
            .unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(backend);

        let paths = vec![
            "a.jpg".to_string(),
            "sub/b.jpg".to_string(),
            "gone.jpg".to_string(),
        ];
        let outcome = delete_orphans(store.as_ref(), "visitor-photos", &paths, 2).await;

        assert_eq!(
            outcome,
            CleanupOutcome {
                deleted: 2,
                total: 3,
                already_missing: 1,
                failed: 0,
            }
        );
        assert!(!store.exists("a.jpg").await.unwrap());

        // Nothing left to remove the second time around.
        let again = delete_orphans(store.as_ref(), "visitor-photos", &paths[..2], 2).await;
        assert_eq!(again.deleted, 0);
        assert_eq!(again.already_missing, 2);
    }

    #[test]
    fn test_reconcile_options_from_config() {
        let options = reconcile_options(&ReconcileConfig::default(), "profiles");
        assert_eq!(options.bucket, "profiles");
        assert!(options.is_reserved("systems/logo.png"));
        assert!(options.is_external("https://k.kakaocdn.net/p.jpg"));
    }

    #[test]
    fn test_cleanup_summary() {
        let report = CleanupReport {
            visitor: CleanupOutcome {
                deleted: 2,
                total: 3,
                already_missing: 0,
                failed: 1,
            },
            profile: CleanupOutcome::default(),
        };
        assert_eq!(
            report.summary(),
            "Deleted 2 of 3 orphan files (visitor 2/3, profile 0/0, failed 1)"
        );
    }
}
