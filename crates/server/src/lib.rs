//! HTTP API server for the farmgate visitor registry.
//!
//! This crate provides:
//! - Farm, visitor entry and profile endpoints, including photo uploads
//! - Orphan-file reconciliation between the database and both buckets
//! - The system log (audit trail), settings and token administration
//! - Bearer-token auth, per-IP and per-token rate limiting, Prometheus metrics

pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod orphans;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use ratelimit::{RateLimitState, TokenIdExtension};
pub use routes::create_router;
pub use state::{AppState, Bucket, BucketStores};
