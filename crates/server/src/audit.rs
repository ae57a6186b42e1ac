//! System log (audit trail) writer and retention purge.

use crate::error::ApiResult;
use crate::metrics;
use farmgate_core::config::AuditConfig;
use farmgate_core::{AuditAction, LogLevel};
use farmgate_metadata::MetadataStore;
use farmgate_metadata::models::SystemLogRow;
use farmgate_metadata::repos::SystemLogRepo;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// Who performed an audited action.
#[derive(Clone, Debug, Default)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub label: Option<String>,
}

impl Actor {
    /// Actions taken by the server itself (scheduled purges).
    pub fn system() -> Self {
        Self {
            id: None,
            label: Some("system".to_string()),
        }
    }
}

/// One system log entry to be written.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub level: LogLevel,
    pub message: String,
    pub actor: Actor,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Option<Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            action,
            level,
            message: message.into(),
            actor: Actor::default(),
            resource_type: None,
            resource_id: None,
            metadata: None,
        }
    }

    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Write one system log entry and wait for it to be stored.
pub async fn create_system_log<S>(store: &S, event: AuditEvent) -> ApiResult<Uuid>
where
    S: SystemLogRepo + ?Sized,
{
    let row = SystemLogRow {
        log_id: Uuid::new_v4(),
        level: event.level.as_str().to_string(),
        action: event.action.as_str().to_string(),
        message: event.message,
        actor_id: event.actor.id,
        actor_label: event.actor.label,
        resource_type: event.resource_type,
        resource_id: event.resource_id,
        metadata_json: event.metadata.map(|m| m.to_string()),
        created_at: OffsetDateTime::now_utc(),
    };

    if let Err(e) = store.create_system_log(&row).await {
        metrics::AUDIT_WRITE_FAILURES.inc();
        tracing::error!(action = %row.action, error = %e, "Failed to write system log");
        return Err(e.into());
    }

    tracing::debug!(log_id = %row.log_id, action = %row.action, "System log written");
    Ok(row.log_id)
}

/// Delete system log entries older than the retention window and record the purge.
pub async fn purge_system_logs<S>(store: &S, config: &AuditConfig, actor: Actor) -> ApiResult<u64>
where
    S: SystemLogRepo + ?Sized,
{
    let cutoff = OffsetDateTime::now_utc() - config.retention();
    let deleted = store.delete_system_logs_before(cutoff).await?;
    metrics::SYSTEM_LOGS_PURGED.inc_by(deleted);

    tracing::info!(
        deleted,
        retention_days = config.retention_days,
        "Purged old system logs"
    );

    create_system_log(
        store,
        AuditEvent::new(
            AuditAction::SystemLogPurge,
            LogLevel::Info,
            format!(
                "Purged {deleted} system log entries older than {} days",
                config.retention_days
            ),
        )
        .actor(actor)
        .metadata(serde_json::json!({
            "deleted": deleted,
            "retentionDays": config.retention_days,
        })),
    )
    .await?;

    Ok(deleted)
}

/// Run the retention purge on a fixed interval.
pub fn spawn_purge_task(
    metadata: Arc<dyn MetadataStore>,
    config: AuditConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.auto_purge_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = purge_system_logs(metadata.as_ref(), &config, Actor::system()).await {
                tracing::warn!(error = %e, "Scheduled system log purge failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmgate_metadata::SqliteStore;
    use farmgate_metadata::models::SystemLogFilter;

    #[tokio::test]
    async fn test_create_system_log_persists_fields() {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("m.db"), None)
            .await
            .unwrap();

        let actor_id = Uuid::new_v4();
        create_system_log(
            &store,
            AuditEvent::new(AuditAction::SettingUpdated, LogLevel::Warn, "changed")
                .actor(Actor {
                    id: Some(actor_id),
                    label: Some("ops".to_string()),
                })
                .resource("setting", "site_name")
                .metadata(serde_json::json!({"old": "a", "new": "b"})),
        )
        .await
        .unwrap();

        let rows = store
            .list_system_logs(&SystemLogFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.action, "SETTING_UPDATED");
        assert_eq!(row.level, "warn");
        assert_eq!(row.actor_id, Some(actor_id));
        assert_eq!(row.resource_id.as_deref(), Some("site_name"));
        let metadata: Value = serde_json::from_str(row.metadata_json.as_deref().unwrap()).unwrap();
        assert_eq!(metadata["new"], "b");
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_entries_and_records_itself() {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("m.db"), None)
            .await
            .unwrap();

        let old = SystemLogRow {
            log_id: Uuid::new_v4(),
            level: "info".to_string(),
            action: "TOKEN_CREATED".to_string(),
            message: "old".to_string(),
            actor_id: None,
            actor_label: None,
            resource_type: None,
            resource_id: None,
            metadata_json: None,
            created_at: OffsetDateTime::now_utc() - time::Duration::days(200),
        };
        store.create_system_log(&old).await.unwrap();
        let recent = SystemLogRow {
            log_id: Uuid::new_v4(),
            message: "recent".to_string(),
            created_at: OffsetDateTime::now_utc(),
            ..old.clone()
        };
        store.create_system_log(&recent).await.unwrap();

        let deleted = purge_system_logs(&store, &AuditConfig::default(), Actor::system())
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let rows = store
            .list_system_logs(&SystemLogFilter::default())
            .await
            .unwrap();
        let messages: Vec<&str> = rows.iter().map(|r| r.message.as_str()).collect();
        assert!(messages.contains(&"recent"));
        assert!(!messages.contains(&"old"));
        assert!(rows.iter().any(|r| r.action == "SYSTEM_LOG_PURGE"));
    }
}
