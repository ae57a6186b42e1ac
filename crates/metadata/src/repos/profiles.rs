//! Profile repository.

use crate::error::MetadataResult;
use crate::models::ProfileRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    /// Insert or update a profile. `created_at` is kept from the first insert.
    async fn upsert_profile(&self, profile: &ProfileRow) -> MetadataResult<()>;

    async fn get_profile(&self, profile_id: Uuid) -> MetadataResult<Option<ProfileRow>>;

    /// Set or clear the profile image. Fails with `NotFound` when the profile does not exist.
    async fn set_profile_image(
        &self,
        profile_id: Uuid,
        profile_image: Option<&str>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
