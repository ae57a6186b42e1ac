//! Farm endpoints.

use super::common::{format_time, parse_uuid, read_json};
use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use farmgate_core::token::TokenScope;
use farmgate_metadata::models::FarmRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_FARM_NAME_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CreateFarmRequest {
    pub farm_name: String,
    pub owner_profile_id: Option<Uuid>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FarmResponse {
    pub farm_id: String,
    pub farm_name: String,
    pub owner_profile_id: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<FarmRow> for FarmResponse {
    type Error = ApiError;

    fn try_from(row: FarmRow) -> ApiResult<Self> {
        Ok(Self {
            farm_id: row.farm_id.to_string(),
            farm_name: row.farm_name,
            owner_profile_id: row.owner_profile_id.map(|id| id.to_string()),
            address: row.address,
            created_at: format_time(row.created_at)?,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

/// POST /v1/farms
pub async fn create_farm(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<FarmResponse>)> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let body: CreateFarmRequest = read_json(req.into_body()).await?;

    let farm_name = body.farm_name.trim();
    if farm_name.is_empty() || farm_name.len() > MAX_FARM_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "farm_name must be 1-{MAX_FARM_NAME_LEN} characters"
        )));
    }

    let now = OffsetDateTime::now_utc();
    let row = FarmRow {
        farm_id: Uuid::new_v4(),
        farm_name: farm_name.to_string(),
        owner_profile_id: body.owner_profile_id,
        address: body.address.filter(|a| !a.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    state.metadata.create_farm(&row).await?;
    tracing::info!(farm_id = %row.farm_id, "Farm created");

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /v1/farms
pub async fn list_farms(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<FarmResponse>>> {
    require_scope(&req, TokenScope::FarmRead)?;
    let farms = state.metadata.list_farms().await?;
    let response = farms
        .into_iter()
        .map(FarmResponse::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(response))
}

/// GET /v1/farms/{farm_id}
pub async fn get_farm(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
    req: Request,
) -> ApiResult<Json<FarmResponse>> {
    require_scope(&req, TokenScope::FarmRead)?;
    let farm_id = parse_uuid(&farm_id, "farm ID")?;
    let farm = state
        .metadata
        .get_farm(farm_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("farm not found".to_string()))?;
    Ok(Json(farm.try_into()?))
}
