//! System settings repository.

use crate::error::MetadataResult;
use crate::models::SettingRow;
use async_trait::async_trait;
use time::OffsetDateTime;

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get_setting(&self, key: &str) -> MetadataResult<Option<SettingRow>>;

    /// Insert or replace a setting.
    async fn set_setting(
        &self,
        key: &str,
        value: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// All settings ordered by key.
    async fn list_settings(&self) -> MetadataResult<Vec<SettingRow>>;
}
