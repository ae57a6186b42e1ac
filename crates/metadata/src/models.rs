//! Database row types.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Farm record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FarmRow {
    pub farm_id: Uuid,
    pub farm_name: String,
    pub owner_profile_id: Option<Uuid>,
    pub address: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One visit registered at a farm.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VisitorEntryRow {
    pub entry_id: Uuid,
    pub farm_id: Uuid,
    pub visitor_name: String,
    pub visitor_phone: Option<String>,
    pub purpose: Option<String>,
    pub vehicle_number: Option<String>,
    /// Public URL of the uploaded photo in the visitor bucket.
    pub photo_url: Option<String>,
    pub visited_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// User profile.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProfileRow {
    pub profile_id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Uploaded image URL, or an external avatar URL from a social login.
    pub profile_image: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A non-empty storage reference read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReferenceRow {
    pub record_id: Uuid,
    pub value: String,
}

/// Audit log entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SystemLogRow {
    pub log_id: Uuid,
    /// "info", "warn" or "error".
    pub level: String,
    pub action: String,
    pub message: String,
    pub actor_id: Option<Uuid>,
    pub actor_label: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Free-form JSON object.
    pub metadata_json: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Filter for listing audit entries, newest first.
#[derive(Debug, Clone)]
pub struct SystemLogFilter {
    pub level: Option<String>,
    pub action: Option<String>,
    pub limit: u32,
}

impl Default for SystemLogFilter {
    fn default() -> Self {
        Self {
            level: None,
            action: None,
            limit: 100,
        }
    }
}

/// System setting.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: OffsetDateTime,
}

/// Token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub token_hash: String,
    pub scopes: String, // JSON array
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
