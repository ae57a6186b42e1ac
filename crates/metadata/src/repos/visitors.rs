//! Visitor entry repository.

use crate::error::MetadataResult;
use crate::models::VisitorEntryRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for visitor entries.
///
/// Deleting an entry never touches storage; its photo stays in the bucket
/// until an orphan cleanup removes it.
#[async_trait]
pub trait VisitorRepo: Send + Sync {
    /// Register a visit. Fails with `Constraint` when the farm does not exist.
    async fn create_visitor_entry(&self, entry: &VisitorEntryRow) -> MetadataResult<()>;

    async fn get_visitor_entry(&self, entry_id: Uuid) -> MetadataResult<Option<VisitorEntryRow>>;

    /// Entries for a farm, newest visit first.
    async fn list_visitor_entries(
        &self,
        farm_id: Uuid,
        limit: u32,
    ) -> MetadataResult<Vec<VisitorEntryRow>>;

    /// Delete an entry. Fails with `NotFound` when it does not exist.
    async fn delete_visitor_entry(&self, entry_id: Uuid) -> MetadataResult<()>;

    /// Set or clear the photo URL. Fails with `NotFound` when the entry does not exist.
    async fn set_visitor_photo(&self, entry_id: Uuid, photo_url: Option<&str>)
    -> MetadataResult<()>;
}
