//! Server test utilities.

use super::fixtures::sha256_hash;
use super::storage::FlakyStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use farmgate_core::config::{AppConfig, MetadataConfig, StorageConfig};
use farmgate_metadata::models::TokenRow;
use farmgate_metadata::{MetadataStore, SqliteStore};
use farmgate_server::bootstrap::ensure_admin_token;
use farmgate_server::{AppState, Bucket, BucketStores, create_router};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub visitor_store: Arc<FlakyStore>,
    pub profile_store: Arc<FlakyStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        let db_path = temp_dir.path().join("metadata.db");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: db_path.clone(),
            query_timeout_secs: None,
        };
        modifier(&mut config);

        let visitor_store = Arc::new(
            FlakyStore::new(storage_path.join(&config.buckets.visitor_photos))
                .await
                .expect("Failed to create visitor bucket"),
        );
        let profile_store = Arc::new(
            FlakyStore::new(storage_path.join(&config.buckets.profile_images))
                .await
                .expect("Failed to create profile bucket"),
        );
        let buckets = BucketStores {
            visitor: Bucket::new(config.buckets.visitor_photos.clone(), visitor_store.clone()),
            profile: Bucket::new(config.buckets.profile_images.clone(), profile_store.clone()),
        };

        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );
        ensure_admin_token(metadata.as_ref(), &config.admin)
            .await
            .expect("Failed to bootstrap admin token");

        let state = AppState::new(config, buckets, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            visitor_store,
            profile_store,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Send a JSON request and decode the JSON response (Null when empty).
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        auth_token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = auth_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// PUT raw bytes with the given content type.
    pub async fn upload(
        &self,
        uri: &str,
        content_type: &str,
        data: Bytes,
        auth_token: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", auth_token))
            .header("Content-Type", content_type)
            .body(Body::from(data))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Insert a token with `scopes` and return its raw secret.
    pub async fn create_token(&self, scopes: &[&str]) -> String {
        let raw_token = format!("test-token-{}", Uuid::new_v4());
        let token = TokenRow {
            token_id: Uuid::new_v4(),
            token_hash: sha256_hash(raw_token.as_bytes()),
            scopes: serde_json::to_string(scopes).unwrap(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            last_used_at: None,
            description: Some("Test Token".to_string()),
        };
        self.metadata()
            .create_token(&token)
            .await
            .expect("Failed to create token");
        raw_token
    }
}
