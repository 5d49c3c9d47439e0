//! Presence status API endpoint.
//!
//! Read-only snapshot of the observation table and the global flag. The
//! snapshot may lag an in-flight evaluation cycle by design.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use doorman_core::{PresenceState, ProbeOutcome, ScanState};

use crate::state::AppState;

/// Status of one tracked device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "0C:15:63:DF:61:2F",
    "label": "key fob",
    "presence": "present",
    "seconds_since_seen": 12,
    "seconds_since_probe": 45,
    "consecutive_failures": 0,
    "last_result": "skip"
}))]
pub struct DeviceStatusResponse {
    /// Hardware address in canonical form.
    #[schema(example = "0C:15:63:DF:61:2F")]
    pub address: String,

    /// Configured label, if any.
    #[schema(example = "key fob")]
    pub label: Option<String>,

    /// Current verdict: `unknown`, `present` or `absent`.
    #[schema(example = "present")]
    pub presence: String,

    /// Seconds since the last sighting; absent if never seen.
    #[schema(example = 12)]
    pub seconds_since_seen: Option<u64>,

    /// Seconds since the last active probe; absent if never probed.
    #[schema(example = 45)]
    pub seconds_since_probe: Option<u64>,

    /// Consecutive failed probes.
    #[schema(example = 0)]
    pub consecutive_failures: u32,

    /// Outcome of the most recent evaluation step:
    /// `never`, `hit`, `miss` or `skip`.
    #[schema(example = "skip")]
    pub last_result: String,
}

/// Presence snapshot response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Whether any tracked device is present.
    #[schema(example = true)]
    pub global_present: bool,

    /// Run-state of the passive scanner.
    #[schema(example = "running")]
    pub scanner_state: String,

    /// Per-device status in configured order.
    pub devices: Vec<DeviceStatusResponse>,

    /// UTC timestamp of this snapshot.
    #[schema(example = "2026-08-05T12:00:00Z")]
    pub checked_at_utc: String,
}

/// Read the current presence snapshot.
#[utoipa::path(
    get,
    path = "/status",
    tag = "presence",
    operation_id = "getStatus",
    summary = "Read the presence snapshot",
    description = "Returns the per-device observations and the global \
        presence flag as of the last completed evaluation cycle.",
    responses(
        (status = 200, description = "Snapshot read", body = StatusResponse)
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.store().snapshot().await;
    let now = Instant::now();

    let devices = snapshot
        .devices
        .iter()
        .map(|status| DeviceStatusResponse {
            address: status.device.address.to_string(),
            label: status.device.label.clone(),
            presence: presence_label(status.observation.presence).to_string(),
            seconds_since_seen: status
                .observation
                .last_seen
                .map(|t| now.saturating_duration_since(t).as_secs()),
            seconds_since_probe: status
                .observation
                .last_probe
                .map(|t| now.saturating_duration_since(t).as_secs()),
            consecutive_failures: status.observation.consecutive_failures,
            last_result: outcome_label(status.observation.last_result).to_string(),
        })
        .collect();

    Json(StatusResponse {
        global_present: snapshot.global,
        scanner_state: scanner_state_label(state.scanner_state()).to_string(),
        devices,
        checked_at_utc: Utc::now().to_rfc3339(),
    })
}

pub(crate) fn presence_label(state: PresenceState) -> &'static str {
    match state {
        PresenceState::Unknown => "unknown",
        PresenceState::Present => "present",
        PresenceState::Absent => "absent",
    }
}

pub(crate) fn outcome_label(outcome: ProbeOutcome) -> &'static str {
    match outcome {
        ProbeOutcome::Never => "never",
        ProbeOutcome::Hit => "hit",
        ProbeOutcome::Miss => "miss",
        ProbeOutcome::Skip => "skip",
    }
}

pub(crate) fn scanner_state_label(state: ScanState) -> &'static str {
    match state {
        ScanState::Stopped => "stopped",
        ScanState::Starting => "starting",
        ScanState::Running => "running",
        ScanState::Stopping => "stopping",
    }
}
