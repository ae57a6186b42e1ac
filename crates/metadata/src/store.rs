//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    BootstrapRepo, FarmRepo, ProfileRepo, ReferenceRepo, SettingsRepo, SystemLogRepo, TokenRepo,
    VisitorRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    FarmRepo
    + VisitorRepo
    + ProfileRepo
    + ReferenceRepo
    + SystemLogRepo
    + SettingsRepo
    + TokenRepo
    + BootstrapRepo
    + Send
    + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(60));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection avoids persistent "database is locked" failures
            // under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout.as_secs(),
            "SQLite metadata store ready (query timeout is advisory)"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Warn when a query ran past the advisory timeout.
    fn note_slow(&self, query: &'static str, started: std::time::Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                query,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::ReferenceSource;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl FarmRepo for SqliteStore {
        async fn create_farm(&self, farm: &FarmRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO farms (farm_id, farm_name, owner_profile_id, address, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(farm.farm_id)
            .bind(&farm.farm_name)
            .bind(farm.owner_profile_id)
            .bind(&farm.address)
            .bind(farm.created_at)
            .bind(farm.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, || format!("farm {}", farm.farm_id)))?;
            Ok(())
        }

        async fn get_farm(&self, farm_id: Uuid) -> MetadataResult<Option<FarmRow>> {
            let row = sqlx::query_as::<_, FarmRow>("SELECT * FROM farms WHERE farm_id = ?")
                .bind(farm_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_farms(&self) -> MetadataResult<Vec<FarmRow>> {
            let rows = sqlx::query_as::<_, FarmRow>("SELECT * FROM farms ORDER BY farm_name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl VisitorRepo for SqliteStore {
        async fn create_visitor_entry(&self, entry: &VisitorEntryRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO visitor_entries (
                    entry_id, farm_id, visitor_name, visitor_phone, purpose,
                    vehicle_number, photo_url, visited_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.entry_id)
            .bind(entry.farm_id)
            .bind(&entry.visitor_name)
            .bind(&entry.visitor_phone)
            .bind(&entry.purpose)
            .bind(&entry.vehicle_number)
            .bind(&entry.photo_url)
            .bind(entry.visited_at)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || format!("visitor entry {}", entry.entry_id))
            })?;
            Ok(())
        }

        async fn get_visitor_entry(
            &self,
            entry_id: Uuid,
        ) -> MetadataResult<Option<VisitorEntryRow>> {
            let row = sqlx::query_as::<_, VisitorEntryRow>(
                "SELECT * FROM visitor_entries WHERE entry_id = ?",
            )
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_visitor_entries(
            &self,
            farm_id: Uuid,
            limit: u32,
        ) -> MetadataResult<Vec<VisitorEntryRow>> {
            let rows = sqlx::query_as::<_, VisitorEntryRow>(
                "SELECT * FROM visitor_entries WHERE farm_id = ? ORDER BY visited_at DESC LIMIT ?",
            )
            .bind(farm_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_visitor_entry(&self, entry_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM visitor_entries WHERE entry_id = ?")
                .bind(entry_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("visitor entry {entry_id}")));
            }
            Ok(())
        }

        async fn set_visitor_photo(
            &self,
            entry_id: Uuid,
            photo_url: Option<&str>,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE visitor_entries SET photo_url = ? WHERE entry_id = ?")
                .bind(photo_url)
                .bind(entry_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("visitor entry {entry_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProfileRepo for SqliteStore {
        async fn upsert_profile(&self, profile: &ProfileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO profiles (profile_id, display_name, email, profile_image, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(profile_id) DO UPDATE SET
                    display_name = excluded.display_name,
                    email = excluded.email,
                    profile_image = excluded.profile_image,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(profile.profile_id)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(&profile.profile_image)
            .bind(profile.created_at)
            .bind(profile.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_profile(&self, profile_id: Uuid) -> MetadataResult<Option<ProfileRow>> {
            let row =
                sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE profile_id = ?")
                    .bind(profile_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn set_profile_image(
            &self,
            profile_id: Uuid,
            profile_image: Option<&str>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE profiles SET profile_image = ?, updated_at = ? WHERE profile_id = ?",
            )
            .bind(profile_image)
            .bind(updated_at)
            .bind(profile_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("profile {profile_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ReferenceRepo for SqliteStore {
        async fn list_references(
            &self,
            source: ReferenceSource,
        ) -> MetadataResult<Vec<ReferenceRow>> {
            let sql = source.select_sql();
            let started = std::time::Instant::now();
            let rows = sqlx::query_as::<_, ReferenceRow>(&sql)
                .fetch_all(&self.pool)
                .await?;
            self.note_slow("list_references", started);
            Ok(rows)
        }
    }

    #[async_trait]
    impl SystemLogRepo for SqliteStore {
        async fn create_system_log(&self, entry: &SystemLogRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO system_logs (
                    log_id, level, action, message, actor_id, actor_label,
                    resource_type, resource_id, metadata_json, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.log_id)
            .bind(&entry.level)
            .bind(&entry.action)
            .bind(&entry.message)
            .bind(entry.actor_id)
            .bind(&entry.actor_label)
            .bind(&entry.resource_type)
            .bind(&entry.resource_id)
            .bind(&entry.metadata_json)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_system_logs(
            &self,
            filter: &SystemLogFilter,
        ) -> MetadataResult<Vec<SystemLogRow>> {
            let rows = sqlx::query_as::<_, SystemLogRow>(
                r#"
                SELECT * FROM system_logs
                WHERE (?1 IS NULL OR level = ?1)
                  AND (?2 IS NULL OR action = ?2)
                ORDER BY julianday(created_at) DESC
                LIMIT ?3
                "#,
            )
            .bind(&filter.level)
            .bind(&filter.action)
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_system_logs_before(&self, cutoff: OffsetDateTime) -> MetadataResult<u64> {
            let started = std::time::Instant::now();
            let result =
                sqlx::query("DELETE FROM system_logs WHERE julianday(created_at) < julianday(?)")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await?;
            self.note_slow("delete_system_logs_before", started);
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl SettingsRepo for SqliteStore {
        async fn get_setting(&self, key: &str) -> MetadataResult<Option<SettingRow>> {
            let row = sqlx::query_as::<_, SettingRow>("SELECT * FROM system_settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn set_setting(
            &self,
            key: &str,
            value: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO system_settings (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_settings(&self) -> MetadataResult<Vec<SettingRow>> {
            let rows = sqlx::query_as::<_, SettingRow>("SELECT * FROM system_settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, token_hash, scopes, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.token_hash)
            .bind(&token.scopes)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, || "token hash already registered".to_string()))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE tokens SET revoked_at = ? WHERE token_id = ? AND revoked_at IS NULL",
            )
            .bind(revoked_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 && self.get_token(token_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("token {token_id}")));
            }
            Ok(())
        }

        async fn list_tokens(&self) -> MetadataResult<Vec<TokenRow>> {
            let rows =
                sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<Option<String>> =
                sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            value
                .flatten()
                .filter(|id| !id.is_empty())
                .map(|id| {
                    Uuid::parse_str(&id).map_err(|e| {
                        MetadataError::Internal(format!(
                            "invalid bootstrap_token_id uuid '{id}': {e}"
                        ))
                    })
                })
                .transpose()
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn clear_bootstrap_token_id(&self) -> MetadataResult<()> {
            sqlx::query("UPDATE bootstrap_state SET bootstrap_token_id = NULL WHERE id = 1")
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    profile_id BLOB PRIMARY KEY,
    display_name TEXT,
    email TEXT,
    profile_image TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS farms (
    farm_id BLOB PRIMARY KEY,
    farm_name TEXT NOT NULL,
    owner_profile_id BLOB,
    address TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_farms_name ON farms(farm_name);

CREATE TABLE IF NOT EXISTS visitor_entries (
    entry_id BLOB PRIMARY KEY,
    farm_id BLOB NOT NULL REFERENCES farms(farm_id) ON DELETE CASCADE,
    visitor_name TEXT NOT NULL,
    visitor_phone TEXT,
    purpose TEXT,
    vehicle_number TEXT,
    photo_url TEXT,
    visited_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_visitor_entries_farm ON visitor_entries(farm_id, visited_at);

CREATE TABLE IF NOT EXISTS system_logs (
    log_id BLOB PRIMARY KEY,
    level TEXT NOT NULL,
    action TEXT NOT NULL,
    message TEXT NOT NULL,
    actor_id BLOB,
    actor_label TEXT,
    resource_type TEXT,
    resource_id TEXT,
    metadata_json TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_system_logs_created ON system_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_system_logs_action ON system_logs(action);

CREATE TABLE IF NOT EXISTS system_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    token_hash TEXT NOT NULL UNIQUE,
    scopes TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);

CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
"#;
