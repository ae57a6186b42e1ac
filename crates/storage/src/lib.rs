//! Object storage abstraction and backends for farmgate.
//!
//! This crate provides:
//! - One [`ObjectStore`] per bucket (visitor photos, profile images)
//! - Backends: local filesystem and S3-compatible
//! - Recursive bucket enumeration over single-level listings ([`list_all_files`])

pub mod backends;
pub mod error;
pub mod traits;
pub mod walk;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ListEntry, ObjectStore};
pub use walk::{ListingFailure, WalkOptions, WalkReport, list_all_files};

use farmgate_core::config::StorageConfig;
use std::sync::Arc;

/// Create the object store for one bucket.
///
/// The filesystem backend keeps each bucket in `<path>/<bucket>`; the S3
/// backend addresses the S3 bucket of the same name.
pub async fn from_config(
    config: &StorageConfig,
    bucket: &str,
) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
        return Err(StorageError::Config(format!(
            "invalid bucket name: {bucket:?}"
        )));
    }

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path.join(bucket)).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_separates_buckets() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
        };

        let visitor = from_config(&config, "visitor-photos").await.unwrap();
        let profile = from_config(&config, "profiles").await.unwrap();

        visitor
            .put("a.jpg", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(visitor.exists("a.jpg").await.unwrap());
        assert!(!profile.exists("a.jpg").await.unwrap());
        assert!(temp.path().join("store/visitor-photos/a.jpg").exists());
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: Some("secret".to_string()),
            force_path_style: true,
        };

        let store = from_config(&config, "profiles").await.unwrap();
        assert_eq!(store.backend_name(), "s3");
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config, "profiles").await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn from_config_rejects_bad_bucket_name() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().to_path_buf(),
        };
        assert!(matches!(
            from_config(&config, "../up").await,
            Err(StorageError::Config(_))
        ));
    }
}
