//! Manual trigger API endpoint.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::trigger::TriggerOutcome;

/// Successful trigger response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "activated": true,
    "triggered_at_utc": "2026-08-05T12:00:00Z"
}))]
pub struct TriggerResponse {
    /// The actuator was pulsed.
    #[schema(example = true)]
    pub activated: bool,

    /// When the trigger was handled.
    #[schema(example = "2026-08-05T12:00:00Z")]
    pub triggered_at_utc: String,
}

/// Fire the manual trigger.
///
/// The actuator is pulsed only when the most recently published global
/// presence flag is true; edges inside the debounce window are suppressed.
#[utoipa::path(
    post,
    path = "/trigger",
    tag = "actuation",
    operation_id = "fireTrigger",
    summary = "Fire the manual trigger",
    responses(
        (status = 200, description = "Actuator pulsed", body = TriggerResponse),
        (status = 403, description = "No tracked device is present", body = super::error::ErrorResponse),
        (status = 429, description = "Edge suppressed by debounce", body = super::error::ErrorResponse)
    )
)]
pub async fn fire_trigger(State(state): State<AppState>) -> ApiResult<Json<TriggerResponse>> {
    match state.trigger().fire().await {
        TriggerOutcome::Activated => Ok(Json(TriggerResponse {
            activated: true,
            triggered_at_utc: Utc::now().to_rfc3339(),
        })),
        TriggerOutcome::Denied => Err(ApiError::Forbidden {
            error_code: "not_present".to_string(),
            message: "No tracked device is present".to_string(),
        }),
        TriggerOutcome::Debounced => Err(ApiError::TooManyRequests {
            error_code: "debounced".to_string(),
            message: "Trigger suppressed by the debounce window".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_response_serialization() {
        let response = TriggerResponse {
            activated: true,
            triggered_at_utc: "2026-08-05T12:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"activated\":true"));
    }
}
