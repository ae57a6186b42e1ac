//! Authentication and authorization middleware.

use crate::audit::Actor;
use crate::error::{ApiError, ApiResult};
use crate::ratelimit::TokenIdExtension;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use farmgate_core::token::{Token, TokenId, TokenScope};
use farmgate_metadata::models::TokenRow;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

/// Client trace IDs longer than this are cut.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Sanitize a client-provided value: at most 128 chars, printable ASCII only.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The validated token.
    pub token: Token,
}

impl AuthenticatedUser {
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.token.has_scope(scope)
    }

    /// Require a specific scope, returning 403 if not present.
    pub fn require_scope(&self, scope: TokenScope) -> ApiResult<()> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "missing required scope: {scope}"
            )))
        }
    }

    /// Identity recorded in system logs.
    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(*self.token.id.as_uuid()),
            label: self.token.description.clone(),
        }
    }
}

/// Extract the bearer token. The scheme is case-insensitive (RFC 6750).
fn extract_bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(7)?;
    scheme.eq_ignore_ascii_case("bearer ").then_some(token.trim())
}

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default()
}

/// Lowercase hex SHA-256 of a token secret, as stored in `tokens.token_hash`.
pub fn hash_token(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Build a [`Token`] from its row. Unknown scopes are dropped with a warning.
pub fn token_from_row(row: &TokenRow) -> ApiResult<Token> {
    let raw: Vec<String> = serde_json::from_str(&row.scopes)
        .map_err(|e| ApiError::Internal(format!("invalid token scopes: {e}")))?;

    let scopes: HashSet<TokenScope> = raw
        .iter()
        .filter_map(|s| {
            TokenScope::parse(s)
                .inspect_err(|_| {
                    tracing::warn!(
                        token_id = %row.token_id,
                        invalid_scope = %s,
                        "Token contains invalid scope, ignoring"
                    );
                })
                .ok()
        })
        .collect();

    Ok(Token {
        id: TokenId::from_uuid(row.token_id),
        scopes,
        expires_at: row.expires_at,
        revoked_at: row.revoked_at,
        created_at: row.created_at,
        description: row.description.clone(),
    })
}

/// Validates bearer tokens and runs the request inside a span carrying the trace ID.
///
/// Requests without a token pass through unauthenticated; handlers decide
/// whether that is acceptable. A presented token that is unknown, expired or
/// revoked is rejected here.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);

    if let Some(secret) = extract_bearer_token(&req) {
        let token_hash = hash_token(secret);
        let row = state
            .metadata
            .get_token_by_hash(&token_hash)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;

        let token = token_from_row(&row)?;
        if !token.is_valid() {
            return Err(ApiError::Unauthorized(
                "token expired or revoked".to_string(),
            ));
        }

        // last_used_at is best effort.
        let metadata = state.metadata.clone();
        let token_id = row.token_id;
        tokio::spawn(async move {
            if let Err(e) = metadata
                .touch_token(token_id, OffsetDateTime::now_utc())
                .await
            {
                tracing::debug!(token_id = %token_id, error = %e, "Failed to touch token");
            }
        });

        req.extensions_mut()
            .insert(TokenIdExtension(row.token_id.to_string()));
        req.extensions_mut().insert(AuthenticatedUser { token });
    }

    Ok(next.run(req).instrument(span).await)
}

/// Require authentication (token must be present).
pub fn require_auth(req: &Request) -> ApiResult<&AuthenticatedUser> {
    req.extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// Require authentication and a scope; 401 without a token, 403 without the scope.
pub fn require_scope(req: &Request, scope: TokenScope) -> ApiResult<&AuthenticatedUser> {
    let auth = require_auth(req)?;
    auth.require_scope(scope)?;
    Ok(auth)
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
