//! Orphan-file check and cleanup endpoints.

use crate::auth::require_scope;
use crate::error::ApiResult;
use crate::orphans::{CleanupOutcome, DomainScan, run_check, run_cleanup};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use farmgate_core::ReferenceRecord;
use farmgate_core::token::TokenScope;
use serde::Serialize;

/// One failed directory listing.
#[derive(Debug, Serialize)]
pub struct StorageFailureInfo {
    pub prefix: String,
    pub kind: &'static str,
}

/// Troubleshooting detail for one domain.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDebug {
    pub bucket: String,
    pub used_urls: Vec<String>,
    pub storage_files: Vec<String>,
    pub storage_file_count: usize,
    pub reference_count: usize,
    pub excluded_reference_count: usize,
    /// Set when part of the bucket could not be listed.
    pub storage_error: Option<String>,
    pub storage_failures: Vec<StorageFailureInfo>,
    pub truncated_prefixes: Vec<String>,
}

impl From<&DomainScan> for DomainDebug {
    fn from(scan: &DomainScan) -> Self {
        let failures = &scan.walk.failures;
        let storage_error = (!failures.is_empty()).then(|| {
            format!(
                "listing failed for {} prefix(es); results may be incomplete",
                failures.len()
            )
        });

        let mut storage_files = scan.walk.files.clone();
        storage_files.sort();

        Self {
            bucket: scan.bucket.clone(),
            used_urls: scan.used_urls.clone(),
            storage_file_count: storage_files.len(),
            storage_files,
            reference_count: scan.result.counts.references,
            excluded_reference_count: scan.result.counts.excluded_references,
            storage_error,
            storage_failures: failures
                .iter()
                .map(|f| StorageFailureInfo {
                    prefix: f.prefix.clone(),
                    kind: f.kind,
                })
                .collect(),
            truncated_prefixes: scan.walk.truncated.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrphanDebug {
    pub visitor: DomainDebug,
    pub profile: DomainDebug,
}

/// Check endpoint response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanCheckResponse {
    pub visitor_orphans: Vec<String>,
    pub profile_orphans: Vec<String>,
    pub visitor_orphan_count: usize,
    pub profile_orphan_count: usize,
    pub visitor_db_orphans: Vec<ReferenceRecord>,
    pub profile_db_orphans: Vec<ReferenceRecord>,
    pub debug: OrphanDebug,
}

/// GET /v1/admin/orphan-files
///
/// Read-only. Partial listing failures degrade to partial data with
/// `debug.*.storageError` set.
pub async fn check_orphan_files(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<OrphanCheckResponse>> {
    require_scope(&req, TokenScope::SystemAdmin)?;

    let check = run_check(
        state.metadata.as_ref(),
        &state.buckets,
        &state.config.reconcile,
    )
    .await?;

    let debug = OrphanDebug {
        visitor: DomainDebug::from(&check.visitor),
        profile: DomainDebug::from(&check.profile),
    };

    Ok(Json(OrphanCheckResponse {
        visitor_orphan_count: check.visitor.result.orphan_files.len(),
        profile_orphan_count: check.profile.result.orphan_files.len(),
        visitor_orphans: check.visitor.result.orphan_files,
        profile_orphans: check.profile.result.orphan_files,
        visitor_db_orphans: check.visitor.result.dangling_references,
        profile_db_orphans: check.profile.result.dangling_references,
        debug,
    }))
}

/// Per-domain cleanup counts.
#[derive(Debug, Serialize)]
pub struct CleanupCounts {
    pub deleted: usize,
    pub total: usize,
    pub failed: usize,
}

impl From<CleanupOutcome> for CleanupCounts {
    fn from(outcome: CleanupOutcome) -> Self {
        Self {
            deleted: outcome.deleted,
            total: outcome.total,
            failed: outcome.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupResults {
    pub visitor: CleanupCounts,
    pub profile: CleanupCounts,
}

/// Cleanup endpoint response.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub results: CleanupResults,
}

/// POST /v1/admin/orphan-files/cleanup
pub async fn cleanup_orphan_files(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<CleanupResponse>> {
    let actor = require_scope(&req, TokenScope::SystemAdmin)?.actor();

    let report = run_cleanup(
        state.metadata.as_ref(),
        &state.buckets,
        &state.config.reconcile,
        actor,
    )
    .await?;

    Ok(Json(CleanupResponse {
        success: true,
        message: report.summary(),
        results: CleanupResults {
            visitor: report.visitor.into(),
            profile: report.profile.into(),
        },
    }))
}
