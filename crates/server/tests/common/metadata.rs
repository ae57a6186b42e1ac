//! In-memory metadata fakes for driving orphan runs without a database.

use async_trait::async_trait;
use farmgate_metadata::models::{ReferenceRow, SystemLogFilter, SystemLogRow};
use farmgate_metadata::repos::{ReferenceRepo, SystemLogRepo};
use farmgate_metadata::{MetadataError, MetadataResult, ReferenceSource};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// Reference columns and a system log held in memory.
///
/// `fail_references` makes every reference query fail; `fail_audit` does the
/// same for system log writes.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeMetadata {
    references: Mutex<HashMap<ReferenceSource, Vec<ReferenceRow>>>,
    logs: Mutex<Vec<SystemLogRow>>,
    fail_references: AtomicBool,
    fail_audit: AtomicBool,
    pub reference_queries: AtomicUsize,
}

#[allow(dead_code)]
impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference and return the id of the row holding it.
    pub fn add_reference(&self, source: ReferenceSource, value: &str) -> Uuid {
        let record_id = Uuid::new_v4();
        self.references
            .lock()
            .unwrap()
            .entry(source)
            .or_default()
            .push(ReferenceRow {
                record_id,
                value: value.to_string(),
            });
        record_id
    }

    pub fn fail_references(&self) {
        self.fail_references.store(true, Ordering::SeqCst);
    }

    pub fn fail_audit(&self) {
        self.fail_audit.store(true, Ordering::SeqCst);
    }

    pub fn logs(&self) -> Vec<SystemLogRow> {
        self.logs.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.logs().into_iter().map(|l| l.action).collect()
    }
}

#[async_trait]
impl ReferenceRepo for FakeMetadata {
    async fn list_references(&self, source: ReferenceSource) -> MetadataResult<Vec<ReferenceRow>> {
        self.reference_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_references.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("injected query failure".to_string()));
        }
        Ok(self
            .references
            .lock()
            .unwrap()
            .get(&source)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| !row.value.is_empty())
            .collect())
    }
}

#[async_trait]
impl SystemLogRepo for FakeMetadata {
    async fn create_system_log(&self, entry: &SystemLogRow) -> MetadataResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("injected audit failure".to_string()));
        }
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list_system_logs(&self, filter: &SystemLogFilter) -> MetadataResult<Vec<SystemLogRow>> {
        let mut logs: Vec<_> = self
            .logs()
            .into_iter()
            .filter(|l| filter.level.as_ref().is_none_or(|lv| &l.level == lv))
            .filter(|l| filter.action.as_ref().is_none_or(|a| &l.action == a))
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(filter.limit as usize);
        Ok(logs)
    }

    async fn delete_system_logs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|l| l.created_at >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}
