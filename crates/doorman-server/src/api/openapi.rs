//! OpenAPI specification generation.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::status::{DeviceStatusResponse, StatusResponse};
use super::trigger::TriggerResponse;

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Main OpenAPI document for the doorman status interface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "doorman API",
        version = "0.1.0",
        description = "Presence-gated door control. Read the per-device \
            presence snapshot, and fire the manual trigger to pulse the \
            actuator while a tracked tag is nearby."
    ),
    paths(
        super::health::health_check,
        super::status::get_status,
        super::trigger::fire_trigger,
    ),
    components(schemas(
        HealthResponse,
        StatusResponse,
        DeviceStatusResponse,
        TriggerResponse,
        ErrorResponse,
    )),
    tags(
        (name = "presence", description = "Presence snapshot"),
        (name = "actuation", description = "Manual trigger"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;
