//! Bootstrap admin token.

use crate::audit::{Actor, AuditEvent, create_system_log};
use anyhow::{Context, Result, bail};
use farmgate_core::config::AdminConfig;
use farmgate_core::token::TokenScope;
use farmgate_core::{AuditAction, LogLevel};
use farmgate_metadata::MetadataStore;
use farmgate_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

const DEFAULT_ADMIN_SCOPE: &str = "system:admin";

/// Normalize a configured hash: optional `sha256:` prefix, lowercase hex.
fn normalize_hash(raw: &str) -> Result<String> {
    let hash = raw.strip_prefix("sha256:").unwrap_or(raw).to_lowercase();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    Ok(hash)
}

/// Make sure the configured admin token exists.
///
/// When the configured hash differs from the one created on a previous start,
/// the previous bootstrap token is revoked and a new one is registered.
/// A hash matching a revoked or expired token is refused.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    let hash = normalize_hash(&config.token_hash)?;
    let now = OffsetDateTime::now_utc();

    if let Some(existing) = metadata.get_token_by_hash(&hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); configure a new token",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={expires_at})",
                existing.token_id
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!(token_id = %existing.token_id, "Admin token already registered");
        return Ok(());
    }

    let scopes = config
        .token_scopes
        .clone()
        .unwrap_or_else(|| vec![DEFAULT_ADMIN_SCOPE.to_string()]);
    for scope in &scopes {
        TokenScope::parse(scope).with_context(|| format!("invalid admin scope: {scope}"))?;
    }

    if let Some(previous) = metadata.get_bootstrap_token_id().await? {
        metadata.revoke_token(previous, now).await?;
        tracing::info!(token_id = %previous, "Previous admin token revoked");
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash,
        scopes: serde_json::to_string(&scopes)?,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };
    metadata.create_token(&token).await?;
    metadata.set_bootstrap_token_id(token.token_id).await?;

    create_system_log(
        metadata,
        AuditEvent::new(
            AuditAction::TokenCreated,
            LogLevel::Info,
            "Bootstrap admin token registered",
        )
        .actor(Actor::system())
        .resource("token", token.token_id.to_string()),
    )
    .await
    .context("failed to record admin token creation")?;

    tracing::info!(token_id = %token.token_id, "Admin token created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hash() {
        let hex = "AB".repeat(32);
        assert_eq!(
            normalize_hash(&format!("sha256:{hex}")).unwrap(),
            "ab".repeat(32)
        );
        assert!(normalize_hash("abc").is_err());
        assert!(normalize_hash(&"zz".repeat(32)).is_err());
    }
}
