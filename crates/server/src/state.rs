//! Application state shared across handlers.

use crate::ratelimit::RateLimitState;
use farmgate_core::ReconcileDomain;
use farmgate_core::config::AppConfig;
use farmgate_metadata::{MetadataStore, ReferenceSource};
use farmgate_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// An opened bucket and its name.
#[derive(Clone)]
pub struct Bucket {
    pub name: String,
    pub store: Arc<dyn ObjectStore>,
}

impl Bucket {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

/// The two buckets that hold uploaded files.
#[derive(Clone)]
pub struct BucketStores {
    pub visitor: Bucket,
    pub profile: Bucket,
}

impl BucketStores {
    pub fn for_domain(&self, domain: ReconcileDomain) -> &Bucket {
        match domain {
            ReconcileDomain::Visitor => &self.visitor,
            ReconcileDomain::Profile => &self.profile,
        }
    }
}

/// Database column holding the references into a domain's bucket.
pub fn reference_source(domain: ReconcileDomain) -> ReferenceSource {
    match domain {
        ReconcileDomain::Visitor => ReferenceSource::VisitorPhotos,
        ReconcileDomain::Profile => ReferenceSource::ProfileImages,
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Visitor photo and profile image buckets.
    pub buckets: BucketStores,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
}

impl AppState {
    /// Create a new application state. The configuration is expected to have
    /// passed [`AppConfig::validate`] already.
    pub fn new(
        config: AppConfig,
        buckets: BucketStores,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let rate_limit = RateLimitState::new(&config.rate_limit);

        Self {
            config: Arc::new(config),
            buckets,
            metadata,
            rate_limit,
        }
    }

    /// Interval for the rate limiter cleanup task, or `None` when limiting is off.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if !self.rate_limit.is_enabled() {
            return None;
        }
        let secs = self.config.rate_limit.cleanup_interval_secs;
        // tokio::time::interval panics on zero.
        if secs == 0 {
            tracing::warn!("rate_limit.cleanup_interval_secs is 0, using 60 seconds");
            return Some(Duration::from_secs(60));
        }
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmgate_metadata::SqliteStore;
    use farmgate_storage::FilesystemBackend;
    use tempfile::tempdir;

    async fn build_state(config: AppConfig) -> (tempfile::TempDir, AppState) {
        let temp = tempdir().unwrap();
        let visitor: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp.path().join("visitor-photos"))
                .await
                .unwrap(),
        );
        let profile: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(temp.path().join("profiles"))
                .await
                .unwrap(),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );

        let buckets = BucketStores {
            visitor: Bucket::new("visitor-photos", visitor),
            profile: Bucket::new("profiles", profile),
        };
        (temp, AppState::new(config, buckets, metadata))
    }

    #[tokio::test]
    async fn rate_limit_cleanup_interval_none_when_disabled() {
        let (_temp, state) = build_state(AppConfig::for_testing()).await;
        assert!(state.rate_limit_cleanup_interval().is_none());
    }

    #[tokio::test]
    async fn rate_limit_cleanup_interval_respects_config() {
        let mut config = AppConfig::for_testing();
        config.rate_limit.enabled = true;
        config.rate_limit.cleanup_interval_secs = 12;

        let (_temp, state) = build_state(config).await;
        assert_eq!(
            state.rate_limit_cleanup_interval(),
            Some(Duration::from_secs(12))
        );
    }

    #[tokio::test]
    async fn buckets_resolve_by_domain() {
        let (_temp, state) = build_state(AppConfig::for_testing()).await;
        assert_eq!(
            state.buckets.for_domain(ReconcileDomain::Visitor).name,
            "visitor-photos"
        );
        assert_eq!(
            state.buckets.for_domain(ReconcileDomain::Profile).name,
            "profiles"
        );
        assert_eq!(
            reference_source(ReconcileDomain::Profile),
            ReferenceSource::ProfileImages
        );
    }
}
