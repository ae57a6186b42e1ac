//! Prometheus metrics for farmgate.
//!
//! Reconciliation metrics carry a `domain` label (`visitor` or `profile`).
//!
//! The `/metrics` endpoint is unauthenticated. It exposes aggregate counts only,
//! but should still be reachable from the scraper network alone.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn domain_counter(name: &str, help: &str) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), &["domain"]).expect("metric creation failed")
}

// Reconciliation
pub static ORPHAN_SCANS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_orphan_scans_total",
        "Reconciliation scans run, per domain",
    )
});

pub static ORPHAN_FILES_FOUND: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_orphan_files_found_total",
        "Storage objects found without a database reference",
    )
});

pub static DANGLING_REFERENCES_FOUND: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_dangling_references_found_total",
        "Database references found without a storage object",
    )
});

pub static LISTING_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_storage_listing_failures_total",
        "Directory listings that failed during a bucket walk",
    )
});

pub static SCAN_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "farmgate_orphan_scan_duration_seconds",
            "Time to collect references, walk a bucket and reconcile",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["domain"],
    )
    .expect("metric creation failed")
});

// Cleanup
pub static ORPHAN_FILES_DELETED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_orphan_files_deleted_total",
        "Orphan files deleted by cleanup runs",
    )
});

pub static ORPHAN_DELETE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter(
        "farmgate_orphan_delete_failures_total",
        "Orphan deletions that failed",
    )
});

// Uploads
pub static PHOTO_UPLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter("farmgate_photo_uploads_total", "Images uploaded")
});

pub static PHOTO_UPLOAD_BYTES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    domain_counter("farmgate_photo_upload_bytes_total", "Image bytes uploaded")
});

// Audit
pub static AUDIT_WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "farmgate_audit_write_failures_total",
        "System log entries that could not be written",
    )
    .expect("metric creation failed")
});

pub static SYSTEM_LOGS_PURGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "farmgate_system_logs_purged_total",
        "System log entries deleted by retention purges",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(ORPHAN_SCANS.clone()),
            Box::new(ORPHAN_FILES_FOUND.clone()),
            Box::new(DANGLING_REFERENCES_FOUND.clone()),
            Box::new(LISTING_FAILURES.clone()),
            Box::new(SCAN_DURATION.clone()),
            Box::new(ORPHAN_FILES_DELETED.clone()),
            Box::new(ORPHAN_DELETE_FAILURES.clone()),
            Box::new(PHOTO_UPLOADS.clone()),
            Box::new(PHOTO_UPLOAD_BYTES.clone()),
            Box::new(AUDIT_WRITE_FAILURES.clone()),
            Box::new(SYSTEM_LOGS_PURGED.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
