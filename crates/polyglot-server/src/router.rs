//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{
    health_check, invoke_handler, list_handlers, readiness_check, upload_handler,
};
use crate::state::AppState;

/// Limits applied by the router.
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// Maximum request body size in bytes, uploads included.
    pub max_body_bytes: usize,
}

impl Default for RouterLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Build the main application router.
///
/// Routes:
/// - `GET /api/v1/handler/:name` - Invoke a bundle
/// - `POST /api/v1/handler/:name` - Upload a bundle archive
/// - `POST /api/v1/handler/:name/invoke` - Invoke a bundle with a body
/// - `GET /api/v1/handlers` - List registered bundles
/// - `GET /health` - Health check
/// - `GET /ready` - Readiness check
pub fn build_router(state: AppState, limits: RouterLimits) -> Router {
    let handler_routes = Router::new()
        .route(
            "/api/v1/handler/:name",
            get(invoke_handler).post(upload_handler),
        )
        .route("/api/v1/handler/:name/invoke", post(invoke_handler))
        .route("/api/v1/handlers", get(list_handlers));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check));

    Router::new()
        .merge(handler_routes)
        .merge(health_routes)
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
