//! Audit log repository.

use crate::error::MetadataResult;
use crate::models::{SystemLogFilter, SystemLogRow};
use async_trait::async_trait;
use time::OffsetDateTime;

#[async_trait]
pub trait SystemLogRepo: Send + Sync {
    async fn create_system_log(&self, entry: &SystemLogRow) -> MetadataResult<()>;

    /// Entries matching `filter`, newest first.
    async fn list_system_logs(&self, filter: &SystemLogFilter)
    -> MetadataResult<Vec<SystemLogRow>>;

    /// Delete entries created before `cutoff`. Returns the number removed.
    async fn delete_system_logs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64>;
}
