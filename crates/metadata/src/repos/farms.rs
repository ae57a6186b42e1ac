//! Farm repository.

use crate::error::MetadataResult;
use crate::models::FarmRow;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait FarmRepo: Send + Sync {
    /// Create a farm. Fails with `AlreadyExists` on a duplicate ID.
    async fn create_farm(&self, farm: &FarmRow) -> MetadataResult<()>;

    async fn get_farm(&self, farm_id: Uuid) -> MetadataResult<Option<FarmRow>>;

    /// List farms ordered by name.
    async fn list_farms(&self) -> MetadataResult<Vec<FarmRow>>;
}
