//! Authentication-related endpoints.

use super::common::format_opt_time;
use crate::auth::require_auth;
use crate::error::ApiResult;
use axum::Json;
use axum::extract::Request;
use serde::Serialize;

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub token_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<String>,
    pub description: Option<String>,
    pub is_admin: bool,
}

/// GET /v1/auth/whoami - Return the calling token's identity.
pub async fn whoami(req: Request) -> ApiResult<Json<WhoamiResponse>> {
    let token = &require_auth(&req)?.token;

    let mut scopes: Vec<String> = token
        .scopes
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    scopes.sort();

    Ok(Json(WhoamiResponse {
        token_id: token.id.to_string(),
        scopes,
        expires_at: format_opt_time(token.expires_at)?,
        description: token.description.clone(),
        is_admin: token.is_admin(),
    }))
}
