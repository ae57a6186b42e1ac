//! Profile endpoints.

use super::common::{format_time, parse_uuid, read_image_upload, read_json, store_image};
use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use farmgate_core::ReconcileDomain;
use farmgate_core::token::TokenScope;
use farmgate_metadata::models::ProfileRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpsertProfileRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Usually an avatar URL handed over by a social login provider.
    pub profile_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ProfileRow> for ProfileResponse {
    type Error = ApiError;

    fn try_from(row: ProfileRow) -> ApiResult<Self> {
        Ok(Self {
            profile_id: row.profile_id.to_string(),
            display_name: row.display_name,
            email: row.email,
            profile_image: row.profile_image,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

/// PUT /v1/profiles/{profile_id}
pub async fn upsert_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ProfileResponse>> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let profile_id = parse_uuid(&profile_id, "profile ID")?;
    let body: UpsertProfileRequest = read_json(req.into_body()).await?;

    if let Some(url) = body.profile_image.as_deref()
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        return Err(ApiError::BadRequest(
            "profile_image must be an http(s) URL; upload files via /image".to_string(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let existing = state.metadata.get_profile(profile_id).await?;
    let row = ProfileRow {
        profile_id,
        display_name: body.display_name,
        email: body.email,
        profile_image: body.profile_image,
        created_at: existing.map_or(now, |p| p.created_at),
        updated_at: now,
    };
    state.metadata.upsert_profile(&row).await?;

    Ok(Json(row.try_into()?))
}

/// GET /v1/profiles/{profile_id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ProfileResponse>> {
    require_scope(&req, TokenScope::FarmRead)?;
    let profile_id = parse_uuid(&profile_id, "profile ID")?;
    let profile = state
        .metadata
        .get_profile(profile_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("profile not found".to_string()))?;
    Ok(Json(profile.try_into()?))
}

/// PUT /v1/profiles/{profile_id}/image
pub async fn upload_profile_image(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    req: Request,
) -> ApiResult<Json<ProfileResponse>> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let profile_id = parse_uuid(&profile_id, "profile ID")?;

    let profile = state
        .metadata
        .get_profile(profile_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("profile not found".to_string()))?;

    let (kind, data) = read_image_upload(req, state.config.server.max_upload_bytes).await?;
    let key = format!(
        "{profile_id}/{}.{}",
        Uuid::new_v4().simple(),
        kind.extension()
    );
    let url = store_image(&state, ReconcileDomain::Profile, &key, data).await?;

    let now = OffsetDateTime::now_utc();
    state
        .metadata
        .set_profile_image(profile_id, Some(url.as_str()), now)
        .await?;

    Ok(Json(
        ProfileRow {
            profile_image: Some(url),
            updated_at: now,
            ..profile
        }
        .try_into()?,
    ))
}
