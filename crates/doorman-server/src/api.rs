//! HTTP API routes and handlers.
//!
//! - `status` - read-only presence snapshot
//! - `trigger` - debounced manual actuation trigger
//! - `health` - service health check
//! - `error` - API error types
//! - `openapi` - OpenAPI specification

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod error;
pub mod health;
pub mod openapi;
pub mod status;
pub mod trigger;

#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};

/// Creates the combined API router.
///
/// ```text
/// /health              - Health check
/// /api
/// ├── /status          - Presence snapshot
/// ├── /trigger         - Manual trigger (POST)
/// └── /openapi.json    - OpenAPI specification
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/status", get(status::get_status))
                .route("/trigger", post(trigger::fire_trigger))
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
