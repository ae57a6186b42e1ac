//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, restrict this endpoint to the scraper at the
    /// network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Largest accepted photo or profile image upload in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Admin token configuration.
///
/// The admin token is required for server operation. It is the only way in on
/// a fresh deployment. If the token hash changes between restarts, the
/// previous admin token is revoked and a new one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Scopes for the admin token (default: ["system:admin"]).
    pub token_scopes: Option<Vec<String>>,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

impl AdminConfig {
    /// Create a test configuration with a dummy token hash.
    ///
    /// **For testing only.** The hash is deterministic but not a real token.
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            token_scopes: None,
            token_description: Some("Test admin token".to_string()),
        }
    }
}

/// Storage backend configuration.
///
/// One backend serves every bucket; each bucket gets its own store rooted at
/// the bucket name.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Buckets are subdirectories of `path`.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage. Buckets map to S3 buckets of the same name.
    S3 {
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix applied inside every bucket.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Bucket names and the public URL base written into stored references.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket holding visitor photos.
    #[serde(default = "default_visitor_bucket")]
    pub visitor_photos: String,
    /// Bucket holding profile images.
    #[serde(default = "default_profile_bucket")]
    pub profile_images: String,
    /// Base of stored URLs: `<public_base_url>/<bucket>/<path>`.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_visitor_bucket() -> String {
    "visitor-photos".to_string()
}

fn default_profile_bucket() -> String {
    "profiles".to_string()
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/files".to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            visitor_photos: default_visitor_bucket(),
            profile_images: default_profile_bucket(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl BucketConfig {
    /// Build the URL stored in the database for an uploaded object.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            bucket,
            key.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        for (field, name) in [
            ("visitor_photos", &self.visitor_photos),
            ("profile_images", &self.profile_images),
        ] {
            if name.is_empty() || name.contains('/') {
                return Err(format!(
                    "buckets.{field} must be a non-empty name without '/', got {name:?}"
                ));
            }
        }
        if self.visitor_photos == self.profile_images {
            return Err("buckets.visitor_photos and buckets.profile_images must differ".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds. Advisory only: SQLite cannot cancel a
        /// running query, slow queries are logged instead.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// WARNING: Prefer FARMGATE_METADATA__PASSWORD over storing in config.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds; PostgreSQL cancels queries past it.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(60)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => {
                    Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
                }
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Orphan-file reconciliation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Storage paths under these prefixes are never reported or deleted.
    #[serde(default = "default_excluded_path_prefixes")]
    pub excluded_path_prefixes: Vec<String>,
    /// Reference values containing any of these hosts are ignored.
    #[serde(default = "default_external_hosts")]
    pub external_hosts: Vec<String>,
    /// Maximum entries requested per directory listing.
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
    /// Sibling directory listings allowed in flight at once.
    #[serde(default = "default_listing_concurrency")]
    pub listing_concurrency: usize,
    /// Deletes allowed in flight at once during cleanup.
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,
    /// Upper bound for a whole check or cleanup run.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_excluded_path_prefixes() -> Vec<String> {
    vec!["systems/".to_string()]
}

fn default_external_hosts() -> Vec<String> {
    vec![
        "googleusercontent.com".to_string(),
        "kakaocdn.net".to_string(),
    ]
}

fn default_listing_limit() -> usize {
    crate::DEFAULT_LISTING_LIMIT
}

fn default_listing_concurrency() -> usize {
    4
}

fn default_delete_concurrency() -> usize {
    8
}

fn default_run_timeout_secs() -> u64 {
    300
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            excluded_path_prefixes: default_excluded_path_prefixes(),
            external_hosts: default_external_hosts(),
            listing_limit: default_listing_limit(),
            listing_concurrency: default_listing_concurrency(),
            delete_concurrency: default_delete_concurrency(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl ReconcileConfig {
    pub fn run_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_timeout_secs)
    }

    /// Reject settings that would stall or disable a run.
    pub fn validate(&self) -> Result<(), String> {
        if self.listing_limit == 0 {
            return Err("reconcile.listing_limit must be at least 1".to_string());
        }
        if self.listing_concurrency == 0 {
            return Err("reconcile.listing_concurrency must be at least 1".to_string());
        }
        if self.delete_concurrency == 0 {
            return Err("reconcile.delete_concurrency must be at least 1".to_string());
        }
        if self.run_timeout_secs == 0 {
            return Err("reconcile.run_timeout_secs must be at least 1".to_string());
        }
        if self.excluded_path_prefixes.iter().any(String::is_empty) {
            // An empty prefix would reserve every path.
            return Err("reconcile.excluded_path_prefixes cannot contain an empty entry".to_string());
        }
        Ok(())
    }
}

/// System log retention.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Entries older than this are removed by a purge.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Purge on a timer in the background (disabled by default).
    #[serde(default)]
    pub auto_purge_enabled: bool,
    #[serde(default = "default_auto_purge_interval_secs")]
    pub auto_purge_interval_secs: u64,
}

fn default_retention_days() -> u32 {
    90
}

fn default_auto_purge_interval_secs() -> u64 {
    86_400
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            auto_purge_enabled: false,
            auto_purge_interval_secs: default_auto_purge_interval_secs(),
        }
    }
}

impl AuditConfig {
    pub fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn auto_purge_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.auto_purge_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days == 0 {
            return Err("audit.retention_days must be at least 1".to_string());
        }
        if self.auto_purge_enabled && self.auto_purge_interval_secs == 0 {
            // tokio::time::interval panics on a zero period.
            return Err("audit.auto_purge_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default)]
    pub enabled: bool,
    /// Requests per minute per IP (for unauthenticated/global limiting).
    #[serde(default = "default_ip_requests_per_minute")]
    pub ip_requests_per_minute: u32,
    /// Requests per minute per token (for authenticated requests).
    #[serde(default = "default_token_requests_per_minute")]
    pub token_requests_per_minute: u32,
    /// Burst size (allows temporary burst above rate limit).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Trusted proxy IP addresses/CIDR ranges.
    /// Forwarded headers are only honored from these peers. Use ["*"] to trust
    /// all proxies (NOT recommended for production).
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// Maximum number of tracked IPs/tokens before new entries are rejected.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Interval in seconds between cleanup sweeps of stale entries.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Entries not accessed within this many seconds are evicted during cleanup.
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,
}

fn default_ip_requests_per_minute() -> u32 {
    60
}

fn default_token_requests_per_minute() -> u32 {
    600
}

fn default_burst_size() -> u32 {
    20
}

fn default_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_entry_ttl_secs() -> u64 {
    300
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_requests_per_minute: default_ip_requests_per_minute(),
            token_requests_per_minute: default_token_requests_per_minute(),
            burst_size: default_burst_size(),
            trusted_proxies: Vec::new(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            entry_ttl_secs: default_entry_ttl_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration.
    /// Returns warnings for insecure-but-allowed settings and an error for
    /// settings that would fail at runtime.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0. \
                 Use a value >= 1 second."
                .to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts ALL forwarded headers. \
                 Clients can spoof their IP address and bypass rate limits."
                    .to_string(),
            );
        }

        if self.entry_ttl_secs < 120 {
            warnings.push(format!(
                "rate_limit.entry_ttl_secs={} is very short. \
                 Entries may be evicted before rate limits reset. \
                 Recommended minimum: 120 seconds.",
                self.entry_ttl_secs
            ));
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata,
    /// and a dummy admin token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            buckets: BucketConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            reconcile: ReconcileConfig::default(),
            audit: AuditConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Run every section's validation. Rate limit warnings are returned for
    /// the caller to log.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.storage.validate()?;
        self.buckets.validate()?;
        self.metadata.validate()?;
        self.reconcile.validate()?;
        self.audit.validate()?;
        self.rate_limit.validate()
    }
}
