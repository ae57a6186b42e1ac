//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{
    BootstrapRepo, FarmRepo, ProfileRepo, ReferenceRepo, ReferenceSource, SettingsRepo,
    SystemLogRepo, TokenRepo, VisitorRepo,
};
use crate::store::MetadataStore;
use async_trait::async_trait;
use farmgate_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters,
    /// so the password can come from its own environment variable.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands, so run them one by one.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl FarmRepo for PostgresStore {
    async fn create_farm(&self, farm: &FarmRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO farms (farm_id, farm_name, owner_profile_id, address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
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
        let row = sqlx::query_as::<_, FarmRow>("SELECT * FROM farms WHERE farm_id = $1")
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
impl VisitorRepo for PostgresStore {
    async fn create_visitor_entry(&self, entry: &VisitorEntryRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO visitor_entries (
                entry_id, farm_id, visitor_name, visitor_phone, purpose,
                vehicle_number, photo_url, visited_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
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
        .map_err(|e| MetadataError::from_insert(e, || format!("visitor entry {}", entry.entry_id)))?;
        Ok(())
    }

    async fn get_visitor_entry(&self, entry_id: Uuid) -> MetadataResult<Option<VisitorEntryRow>> {
        let row =
            sqlx::query_as::<_, VisitorEntryRow>("SELECT * FROM visitor_entries WHERE entry_id = $1")
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
            "SELECT * FROM visitor_entries WHERE farm_id = $1 ORDER BY visited_at DESC LIMIT $2",
        )
        .bind(farm_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_visitor_entry(&self, entry_id: Uuid) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM visitor_entries WHERE entry_id = $1")
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
        let result = sqlx::query("UPDATE visitor_entries SET photo_url = $1 WHERE entry_id = $2")
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
impl ProfileRepo for PostgresStore {
    async fn upsert_profile(&self, profile: &ProfileRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (profile_id, display_name, email, profile_image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(profile_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                profile_image = EXCLUDED.profile_image,
                updated_at = EXCLUDED.updated_at
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
        let row = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE profile_id = $1")
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
            "UPDATE profiles SET profile_image = $1, updated_at = $2 WHERE profile_id = $3",
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
impl ReferenceRepo for PostgresStore {
    async fn list_references(&self, source: ReferenceSource) -> MetadataResult<Vec<ReferenceRow>> {
        let sql = source.select_sql();
        let rows = sqlx::query_as::<_, ReferenceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SystemLogRepo for PostgresStore {
    async fn create_system_log(&self, entry: &SystemLogRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO system_logs (
                log_id, level, action, message, actor_id, actor_label,
                resource_type, resource_id, metadata_json, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
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

    async fn list_system_logs(&self, filter: &SystemLogFilter) -> MetadataResult<Vec<SystemLogRow>> {
        let rows = sqlx::query_as::<_, SystemLogRow>(
            r#"
            SELECT * FROM system_logs
            WHERE ($1::text IS NULL OR level = $1)
              AND ($2::text IS NULL OR action = $2)
            ORDER BY created_at DESC
            LIMIT $3
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
        let result = sqlx::query("DELETE FROM system_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SettingsRepo for PostgresStore {
    async fn get_setting(&self, key: &str) -> MetadataResult<Option<SettingRow>> {
        let row = sqlx::query_as::<_, SettingRow>("SELECT * FROM system_settings WHERE key = $1")
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
            VALUES ($1, $2, $3)
            ON CONFLICT(key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
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
impl TokenRepo for PostgresStore {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (
                token_id, token_hash, scopes, expires_at,
                revoked_at, created_at, last_used_at, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
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
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = $1")
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $1 WHERE token_id = $2")
            .bind(used_at)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE tokens SET revoked_at = $1 WHERE token_id = $2 AND revoked_at IS NULL",
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
        let rows = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BootstrapRepo for PostgresStore {
    async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
        // None: no row. Some(None): row exists with a NULL marker.
        let value: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bootstrap_state (id, bootstrap_token_id)
            VALUES (1, $1)
            ON CONFLICT(id) DO UPDATE
            SET bootstrap_token_id = EXCLUDED.bootstrap_token_id
            "#,
        )
        .bind(token_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_split() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
        assert!(
            statements
                .iter()
                .any(|s| s.contains("CREATE TABLE IF NOT EXISTS visitor_entries"))
        );
        assert!(
            statements
                .iter()
                .any(|s| s.contains("CREATE TABLE IF NOT EXISTS system_logs"))
        );
        // The leading comment block is not a statement of its own.
        assert!(!statements.iter().any(|s| s.lines().all(|l| l.trim().starts_with("--"))));
    }
}
