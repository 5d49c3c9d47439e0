//! # doorman-server
//!
//! The doorman daemon: wires the presence engine from `doorman-core` to the
//! GPIO actuation hardware and exposes the read-only HTTP status interface.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod gpio;
pub mod logging;
pub mod state;
pub mod trigger;

#[cfg(test)]
mod router_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use doorman_core::{
        ActuationConfig, BlinkRate, GpioConfig, PresenceStore, ScanState, TrackedDevice,
    };
    use tokio::sync::watch;

    use crate::api;
    use crate::gpio::GpioGateway;
    use crate::state::AppState;
    use crate::trigger::ManualTrigger;

    fn test_state(dir: &std::path::Path) -> (Arc<PresenceStore>, AppState) {
        let store = Arc::new(PresenceStore::new(
            [TrackedDevice {
                address: "0C:15:63:DF:61:2F".parse().unwrap(),
                label: Some("key fob".into()),
            }],
            3,
        ));
        let gpio = GpioConfig {
            base_dir: dir.to_path_buf(),
            ..GpioConfig::default()
        };
        let actuation = ActuationConfig {
            relay_pulse_ms: 2,
            ..ActuationConfig::default()
        };
        let initial = BlinkRate {
            on: Duration::from_millis(5),
            off: Duration::from_millis(5),
        };
        let (gateway, _indicator) = GpioGateway::new(&gpio, &actuation, initial).unwrap();
        let trigger = ManualTrigger::new(
            Arc::clone(&store),
            Arc::new(gateway),
            Duration::from_millis(0),
        );
        let (_state_tx, state_rx) = watch::channel(ScanState::Running);
        let state = AppState::new(Arc::clone(&store), state_rx, trigger);
        (store, state)
    }

    #[tokio::test]
    async fn health_and_status_endpoints_respond() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, state) = test_state(dir.path());
        let server = axum_test::TestServer::new(api::create_router(state)).unwrap();

        let health = server.get("/health").await;
        health.assert_status_ok();
        assert_eq!(health.json::<serde_json::Value>()["status"], "ok");

        let status = server.get("/api/status").await;
        status.assert_status_ok();
        let body = status.json::<serde_json::Value>();
        assert_eq!(body["global_present"], false);
        assert_eq!(body["devices"][0]["address"], "0C:15:63:DF:61:2F");
        assert_eq!(body["devices"][0]["presence"], "unknown");
    }

    #[tokio::test]
    async fn trigger_is_denied_until_presence_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let (store, state) = test_state(dir.path());
        let server = axum_test::TestServer::new(api::create_router(state)).unwrap();

        let denied = server.post("/api/trigger").await;
        denied.assert_status(axum::http::StatusCode::FORBIDDEN);

        store.publish_global(true).await;
        let granted = server.post("/api/trigger").await;
        granted.assert_status_ok();
        assert_eq!(granted.json::<serde_json::Value>()["activated"], true);
    }
}
