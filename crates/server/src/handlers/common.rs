//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use farmgate_core::ReconcileDomain;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Maximum JSON request body (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// Read and parse a JSON request body.
pub async fn read_json<T: DeserializeOwned>(body: Body) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(body, MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

pub fn parse_uuid(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}

pub fn format_time(t: OffsetDateTime) -> ApiResult<String> {
    t.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

pub fn format_opt_time(t: Option<OffsetDateTime>) -> ApiResult<Option<String>> {
    t.map(format_time).transpose()
}

/// Accepted image formats for uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub fn from_content_type(value: &str) -> Option<Self> {
        let mime = value.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Identify the format from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Read an image upload: declared content type, size cap, and a body whose
/// magic bytes agree with the declared type.
pub async fn read_image_upload(req: Request, max_bytes: usize) -> ApiResult<(ImageKind, Bytes)> {
    let declared = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let kind = ImageKind::from_content_type(&declared).ok_or_else(|| {
        ApiError::UnsupportedMediaType(format!(
            "expected image/jpeg, image/png or image/webp, got {declared:?}"
        ))
    })?;

    if let Some(length) = req
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        && length > max_bytes
    {
        return Err(ApiError::PayloadTooLarge {
            size: length,
            limit: max_bytes,
        });
    }

    let data = axum::body::to_bytes(req.into_body(), max_bytes)
        .await
        .map_err(|_| ApiError::PayloadTooLarge {
            size: max_bytes + 1,
            limit: max_bytes,
        })?;

    if data.is_empty() {
        return Err(ApiError::BadRequest("empty upload".to_string()));
    }
    if ImageKind::sniff(&data) != Some(kind) {
        return Err(ApiError::BadRequest(format!(
            "body is not a valid {} image",
            kind.extension()
        )));
    }

    Ok((kind, data))
}

/// Store an uploaded image in the domain's bucket and return its public URL.
pub async fn store_image(
    state: &AppState,
    domain: ReconcileDomain,
    key: &str,
    data: Bytes,
) -> ApiResult<String> {
    let bucket = state.buckets.for_domain(domain);
    let size = data.len();
    bucket.store.put(key, data).await?;

    metrics::PHOTO_UPLOADS
        .with_label_values(&[domain.as_str()])
        .inc();
    metrics::PHOTO_UPLOAD_BYTES
        .with_label_values(&[domain.as_str()])
        .inc_by(size as u64);
    tracing::info!(domain = %domain, bucket = %bucket.name, key, size, "Stored image");

    Ok(state.config.buckets.public_url(&bucket.name, key))
}
