//! Administrative endpoints: health, system logs, settings and tokens.

use super::common::{format_opt_time, format_time, parse_uuid, read_json};
use crate::audit::{AuditEvent, create_system_log, purge_system_logs};
use crate::auth::{hash_token, require_scope};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use farmgate_core::token::{CreateTokenRequest, CreateTokenResponse, TokenScope};
use farmgate_core::{AuditAction, LogLevel};
use farmgate_metadata::models::{SettingRow, SystemLogFilter, TokenRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_LOG_PAGE: u32 = 1000;
const MAX_SETTING_KEY_LEN: usize = 128;
const MAX_SETTING_VALUE_LEN: usize = 64 * 1024;

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health
///
/// Unauthenticated for load balancer and orchestrator probes; exposes only
/// status and version.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// System logs
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListSystemLogsParams {
    pub limit: Option<u32>,
    pub level: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemLogInfo {
    pub log_id: String,
    pub level: String,
    pub action: String,
    pub message: String,
    pub actor_id: Option<String>,
    pub actor_label: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// GET /v1/admin/system-logs
pub async fn list_system_logs(
    State(state): State<AppState>,
    Query(params): Query<ListSystemLogsParams>,
    req: Request,
) -> ApiResult<Json<Vec<SystemLogInfo>>> {
    require_scope(&req, TokenScope::SystemAdmin)?;

    let level = params
        .level
        .as_deref()
        .map(LogLevel::parse)
        .transpose()?
        .map(|l| l.as_str().to_string());
    let filter = SystemLogFilter {
        level,
        action: params.action.map(|a| a.to_ascii_uppercase()),
        limit: params
            .limit
            .unwrap_or(SystemLogFilter::default().limit)
            .clamp(1, MAX_LOG_PAGE),
    };

    let rows = state.metadata.list_system_logs(&filter).await?;
    let logs = rows
        .into_iter()
        .map(|row| -> ApiResult<SystemLogInfo> {
            // Unparseable metadata is passed through as a string.
            let metadata = row.metadata_json.map(|raw| {
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
            });
            Ok(SystemLogInfo {
                log_id: row.log_id.to_string(),
                level: row.level,
                action: row.action,
                message: row.message,
                actor_id: row.actor_id.map(|id| id.to_string()),
                actor_label: row.actor_label,
                resource_type: row.resource_type,
                resource_id: row.resource_id,
                metadata,
                created_at: format_time(row.created_at)?,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(logs))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub deleted: u64,
    pub retention_days: u32,
}

/// POST /v1/admin/system-logs/purge
pub async fn purge_logs(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<PurgeResponse>> {
    let actor = require_scope(&req, TokenScope::SystemAdmin)?.actor();
    let deleted = purge_system_logs(state.metadata.as_ref(), &state.config.audit, actor).await?;

    Ok(Json(PurgeResponse {
        deleted,
        retention_days: state.config.audit.retention_days,
    }))
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Serialize)]
pub struct SettingInfo {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl TryFrom<SettingRow> for SettingInfo {
    type Error = ApiError;

    fn try_from(row: SettingRow) -> ApiResult<Self> {
        Ok(Self {
            key: row.key,
            value: row.value,
            updated_at: format_time(row.updated_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: String,
}

fn validate_setting_key(key: &str) -> ApiResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_SETTING_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "invalid setting key {key:?}: use 1-{MAX_SETTING_KEY_LEN} of [A-Za-z0-9_.-]"
        )))
    }
}

/// GET /v1/admin/settings
pub async fn list_settings(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<SettingInfo>>> {
    require_scope(&req, TokenScope::SystemAdmin)?;
    let settings = state
        .metadata
        .list_settings()
        .await?
        .into_iter()
        .map(SettingInfo::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(settings))
}

/// PUT /v1/admin/settings/{key}
pub async fn update_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    req: Request,
) -> ApiResult<Json<SettingInfo>> {
    let actor = require_scope(&req, TokenScope::SystemAdmin)?.actor();
    validate_setting_key(&key)?;
    let body: UpdateSettingRequest = read_json(req.into_body()).await?;
    if body.value.len() > MAX_SETTING_VALUE_LEN {
        return Err(ApiError::BadRequest(format!(
            "setting value exceeds {MAX_SETTING_VALUE_LEN} bytes"
        )));
    }

    let previous = state.metadata.get_setting(&key).await?;
    let now = OffsetDateTime::now_utc();
    state.metadata.set_setting(&key, &body.value, now).await?;

    create_system_log(
        state.metadata.as_ref(),
        AuditEvent::new(
            AuditAction::SettingUpdated,
            LogLevel::Info,
            format!("Setting {key} updated"),
        )
        .actor(actor)
        .resource("setting", key.clone())
        .metadata(serde_json::json!({
            "previous": previous.map(|p| p.value),
            "value": body.value,
        })),
    )
    .await?;

    Ok(Json(
        SettingRow {
            key,
            value: body.value,
            updated_at: now,
        }
        .try_into()?,
    ))
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub token_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub description: Option<String>,
}

fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// POST /v1/admin/tokens
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<CreateTokenResponse>)> {
    let actor = require_scope(&req, TokenScope::SystemAdmin)?.actor();
    let body: CreateTokenRequest = read_json(req.into_body()).await?;

    if body.scopes.is_empty() {
        return Err(ApiError::BadRequest("at least one scope is required".to_string()));
    }
    for scope in &body.scopes {
        TokenScope::parse(scope)
            .map_err(|_| ApiError::BadRequest(format!("invalid scope: {scope}")))?;
    }

    let now = OffsetDateTime::now_utc();
    let expires_at = body
        .expires_in
        .map(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(|s| now.checked_add(time::Duration::seconds(s)))
                .ok_or_else(|| ApiError::BadRequest(format!("expires_in too large: {secs}")))
        })
        .transpose()?;

    let token_secret = generate_token_secret();
    let scopes = serde_json::to_string(&body.scopes)
        .map_err(|e| ApiError::Internal(format!("failed to serialize scopes: {e}")))?;
    let row = TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash_token(&token_secret),
        scopes,
        expires_at,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: body.description,
    };
    state.metadata.create_token(&row).await?;

    create_system_log(
        state.metadata.as_ref(),
        AuditEvent::new(AuditAction::TokenCreated, LogLevel::Info, "API token created")
            .actor(actor)
            .resource("token", row.token_id.to_string())
            .metadata(serde_json::json!({ "scopes": body.scopes })),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token_id: row.token_id.to_string(),
            token_secret,
            expires_at: format_opt_time(expires_at)?,
        }),
    ))
}

/// GET /v1/admin/tokens
pub async fn list_tokens(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Vec<TokenInfo>>> {
    require_scope(&req, TokenScope::SystemAdmin)?;

    let tokens = state
        .metadata
        .list_tokens()
        .await?
        .into_iter()
        .map(|token| -> ApiResult<TokenInfo> {
            let scopes: Vec<String> = serde_json::from_str(&token.scopes)
                .map_err(|e| ApiError::Internal(format!("invalid token scopes: {e}")))?;
            Ok(TokenInfo {
                token_id: token.token_id.to_string(),
                scopes,
                expires_at: format_opt_time(token.expires_at)?,
                revoked_at: format_opt_time(token.revoked_at)?,
                created_at: format_time(token.created_at)?,
                last_used_at: format_opt_time(token.last_used_at)?,
                description: token.description,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(tokens))
}

/// DELETE /v1/admin/tokens/{token_id}
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let auth = require_scope(&req, TokenScope::SystemAdmin)?;
    let (caller, actor) = (*auth.token.id.as_uuid(), auth.actor());
    let token_id = parse_uuid(&token_id, "token ID")?;

    if caller == token_id {
        return Err(ApiError::BadRequest(
            "cannot revoke the token used for this request".to_string(),
        ));
    }

    state
        .metadata
        .revoke_token(token_id, OffsetDateTime::now_utc())
        .await?;

    create_system_log(
        state.metadata.as_ref(),
        AuditEvent::new(AuditAction::TokenRevoked, LogLevel::Info, "API token revoked")
            .actor(actor)
            .resource("token", token_id.to_string()),
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
