//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::ratelimit::{ip_rate_limit_middleware, token_rate_limit_middleware};
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/auth/whoami", get(handlers::whoami))
        // Farms and visitor entries
        .route(
            "/v1/farms",
            post(handlers::create_farm).get(handlers::list_farms),
        )
        .route("/v1/farms/{farm_id}", get(handlers::get_farm))
        .route(
            "/v1/farms/{farm_id}/visitors",
            post(handlers::create_visitor).get(handlers::list_visitors),
        )
        .route(
            "/v1/visitors/{entry_id}",
            get(handlers::get_visitor).delete(handlers::delete_visitor),
        )
        .route(
            "/v1/visitors/{entry_id}/photo",
            put(handlers::upload_visitor_photo),
        )
        // Profiles
        .route(
            "/v1/profiles/{profile_id}",
            put(handlers::upsert_profile).get(handlers::get_profile),
        )
        .route(
            "/v1/profiles/{profile_id}/image",
            put(handlers::upload_profile_image),
        );

    // All require SystemAdmin scope
    let admin_routes = Router::new()
        .route("/v1/admin/orphan-files", get(handlers::check_orphan_files))
        .route(
            "/v1/admin/orphan-files/cleanup",
            post(handlers::cleanup_orphan_files),
        )
        .route("/v1/admin/system-logs", get(handlers::list_system_logs))
        .route("/v1/admin/system-logs/purge", post(handlers::purge_logs))
        .route("/v1/admin/settings", get(handlers::list_settings))
        .route("/v1/admin/settings/{key}", put(handlers::update_setting))
        .route(
            "/v1/admin/tokens",
            post(handlers::create_token).get(handlers::list_tokens),
        )
        .route(
            "/v1/admin/tokens/{token_id}",
            delete(handlers::revoke_token),
        );

    let mut router = Router::new().merge(api_routes).merge(admin_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let rate_limit_state = state.rate_limit.clone();

    // Layers run outermost first:
    // TraceLayer -> IP rate limit -> Auth -> Token rate limit -> Handler
    router
        .layer(middleware::from_fn_with_state(
            rate_limit_state.clone(),
            token_rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
