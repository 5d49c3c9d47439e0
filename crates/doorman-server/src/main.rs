//! # doorman-server
//!
//! Presence-gated door control daemon for embedded Linux hardware.
//!
//! Detects the proximity of a fixed set of Bluetooth tags, maintains a
//! debounced global presence verdict, and uses it to gate a relay, drive an
//! indicator LED and announce transitions on a buzzer. A small HTTP API
//! exposes the presence snapshot and a manual trigger.
//!
//! ## Running
//!
//! ```bash
//! # configuration path defaults to /etc/doorman/config.toml
//! DOORMAN_CONFIG=./config.toml cargo run --package doorman-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use doorman_core::{
    DoormanConfig, EvaluatorSettings, PassiveScanner, PresenceEvaluator, PresenceStore, ShellProber,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use doorman_server::gpio::GpioGateway;
use doorman_server::trigger::ManualTrigger;
use doorman_server::{api, logging, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    let config_path = std::env::var_os("DOORMAN_CONFIG")
        .map_or_else(DoormanConfig::default_path, PathBuf::from);
    let config = DoormanConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    info!(
        path = %config_path.display(),
        devices = config.devices.len(),
        "doorman starting"
    );

    let store = Arc::new(PresenceStore::new(
        config.devices.clone(),
        config.presence.max_failures,
    ));
    let settings = EvaluatorSettings::from_config(&config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // the indicator starts on the absence cadence until the first verdict
    let (gateway, indicator) = GpioGateway::new(&config.gpio, &config.actuation, settings.absence_blink)
        .context("setting up GPIO outputs")?;
    let gateway = Arc::new(gateway);

    let (scanner, scanner_state) = PassiveScanner::new(
        Arc::clone(&store),
        config.devices.clone(),
        config.scanner.clone(),
    );
    let scanner_task = tokio::spawn(scanner.run(shutdown_rx.clone()));
    let indicator_task = tokio::spawn(indicator.run(shutdown_rx.clone()));

    let evaluator = PresenceEvaluator::new(
        Arc::clone(&store),
        ShellProber::new(config.probe.clone()),
        Arc::clone(&gateway),
        settings,
    );
    let evaluator_task = tokio::spawn(evaluator.run(shutdown_rx.clone()));

    let trigger = ManualTrigger::new(
        Arc::clone(&store),
        Arc::clone(&gateway),
        config.actuation.trigger_debounce(),
    );
    let app = api::create_router(AppState::new(store, scanner_state, trigger));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    info!(addr = %config.server.bind, "status interface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    // the scanner needs its grace period to wind down the discovery process
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = scanner_task.await;
        let _ = evaluator_task.await;
        let _ = indicator_task.await;
    })
    .await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
