//! Audit log vocabulary shared by the writer and the admin API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a system log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(crate::Error::InvalidLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions recorded in the system log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// An orphan cleanup run finished.
    OrphanCleanup,
    /// An orphan cleanup run aborted.
    OrphanCleanupFailed,
    /// Old system log entries were purged.
    SystemLogPurge,
    /// A system setting changed.
    SettingUpdated,
    /// An API token was created.
    TokenCreated,
    /// An API token was revoked.
    TokenRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanCleanup => "ORPHAN_FILES_CLEANUP",
            Self::OrphanCleanupFailed => "ORPHAN_FILES_CLEANUP_FAILED",
            Self::SystemLogPurge => "SYSTEM_LOG_PURGE",
            Self::SettingUpdated => "SETTING_UPDATED",
            Self::TokenCreated => "TOKEN_CREATED",
            Self::TokenRevoked => "TOKEN_REVOKED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
