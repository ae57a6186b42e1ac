//! Core domain types and shared logic for farmgate.
//!
//! This crate defines the data model used across the other crates:
//! - Application configuration
//! - Token scopes and authorization
//! - Reconciliation domains and audit log vocabulary
//! - The pure orphan-file reconciler

pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod reconcile;
pub mod token;

pub use audit::{AuditAction, LogLevel};
pub use domain::ReconcileDomain;
pub use error::{Error, Result};
pub use reconcile::{OrphanResult, ReconcileCounts, ReconcileOptions, ReferenceRecord, reconcile};
pub use token::{Token, TokenId, TokenScope};

/// Default number of entries requested per directory level when listing a bucket.
pub const DEFAULT_LISTING_LIMIT: usize = 1000;
