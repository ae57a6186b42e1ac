//! Visitor entry endpoints.
//!
//! Deleting an entry leaves its photo in the bucket; the orphan cleanup
//! removes it later.

use super::common::{format_time, parse_uuid, read_image_upload, read_json, store_image};
use crate::auth::require_scope;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use farmgate_core::ReconcileDomain;
use farmgate_core::token::TokenScope;
use farmgate_metadata::models::VisitorEntryRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateVisitorRequest {
    pub visitor_name: String,
    pub visitor_phone: Option<String>,
    pub purpose: Option<String>,
    pub vehicle_number: Option<String>,
    /// RFC 3339; defaults to now.
    pub visited_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisitorResponse {
    pub entry_id: String,
    pub farm_id: String,
    pub visitor_name: String,
    pub visitor_phone: Option<String>,
    pub purpose: Option<String>,
    pub vehicle_number: Option<String>,
    pub photo_url: Option<String>,
    pub visited_at: String,
    pub created_at: String,
}

impl TryFrom<VisitorEntryRow> for VisitorResponse {
    type Error = ApiError;

    fn try_from(row: VisitorEntryRow) -> ApiResult<Self> {
        Ok(Self {
            entry_id: row.entry_id.to_string(),
            farm_id: row.farm_id.to_string(),
            visitor_name: row.visitor_name,
            visitor_phone: row.visitor_phone,
            purpose: row.purpose,
            vehicle_number: row.vehicle_number,
            photo_url: row.photo_url,
            visited_at: format_time(row.visited_at)?,
            created_at: format_time(row.created_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ListVisitorsParams {
    pub limit: Option<u32>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /v1/farms/{farm_id}/visitors
pub async fn create_visitor(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
    req: Request,
) -> ApiResult<(StatusCode, Json<VisitorResponse>)> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let farm_id = parse_uuid(&farm_id, "farm ID")?;
    let body: CreateVisitorRequest = read_json(req.into_body()).await?;

    let visitor_name = body.visitor_name.trim();
    if visitor_name.is_empty() {
        return Err(ApiError::BadRequest("visitor_name is required".to_string()));
    }

    if state.metadata.get_farm(farm_id).await?.is_none() {
        return Err(ApiError::NotFound("farm not found".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    let visited_at = match body.visited_at.as_deref() {
        Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
            .map_err(|e| ApiError::BadRequest(format!("invalid visited_at: {e}")))?,
        None => now,
    };

    let row = VisitorEntryRow {
        entry_id: Uuid::new_v4(),
        farm_id,
        visitor_name: visitor_name.to_string(),
        visitor_phone: non_blank(body.visitor_phone),
        purpose: non_blank(body.purpose),
        vehicle_number: non_blank(body.vehicle_number),
        photo_url: None,
        visited_at,
        created_at: now,
    };
    state.metadata.create_visitor_entry(&row).await?;
    tracing::info!(entry_id = %row.entry_id, farm_id = %farm_id, "Visitor registered");

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// GET /v1/farms/{farm_id}/visitors
pub async fn list_visitors(
    State(state): State<AppState>,
    Path(farm_id): Path<String>,
    Query(params): Query<ListVisitorsParams>,
    req: Request,
) -> ApiResult<Json<Vec<VisitorResponse>>> {
    require_scope(&req, TokenScope::FarmRead)?;
    let farm_id = parse_uuid(&farm_id, "farm ID")?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let entries = state.metadata.list_visitor_entries(farm_id, limit).await?;
    let response = entries
        .into_iter()
        .map(VisitorResponse::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(response))
}

/// GET /v1/visitors/{entry_id}
pub async fn get_visitor(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    req: Request,
) -> ApiResult<Json<VisitorResponse>> {
    require_scope(&req, TokenScope::FarmRead)?;
    let entry_id = parse_uuid(&entry_id, "entry ID")?;
    let entry = state
        .metadata
        .get_visitor_entry(entry_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("visitor entry not found".to_string()))?;
    Ok(Json(entry.try_into()?))
}

/// DELETE /v1/visitors/{entry_id}
pub async fn delete_visitor(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let entry_id = parse_uuid(&entry_id, "entry ID")?;
    state.metadata.delete_visitor_entry(entry_id).await?;
    tracing::info!(entry_id = %entry_id, "Visitor entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/visitors/{entry_id}/photo
///
/// Each upload gets a fresh key, so a replaced photo stays behind as an orphan.
pub async fn upload_visitor_photo(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    req: Request,
) -> ApiResult<Json<VisitorResponse>> {
    require_scope(&req, TokenScope::FarmWrite)?;
    let entry_id = parse_uuid(&entry_id, "entry ID")?;

    let entry = state
        .metadata
        .get_visitor_entry(entry_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("visitor entry not found".to_string()))?;

    let (kind, data) = read_image_upload(req, state.config.server.max_upload_bytes).await?;
    let key = format!(
        "{}/{}-{}.{}",
        entry.farm_id,
        entry_id,
        Uuid::new_v4().simple(),
        kind.extension()
    );
    let url = store_image(&state, ReconcileDomain::Visitor, &key, data).await?;
    state
        .metadata
        .set_visitor_photo(entry_id, Some(url.as_str()))
        .await?;

    Ok(Json(
        VisitorEntryRow {
            photo_url: Some(url),
            ..entry
        }
        .try_into()?,
    ))
}
