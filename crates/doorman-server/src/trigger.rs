//! Manual trigger handling.
//!
//! The trigger is edge-triggered with a debounce window. A debounced edge
//! reads the most recently published global presence flag and activates the
//! actuator only when it is true; absence always denies. The check and the
//! activation are deliberately not atomic with the evaluation cycle — the
//! flag can be at most one cycle stale, which is accepted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use doorman_core::{ActuationGateway, PresenceStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::gpio::GpioGateway;

/// What happened to one trigger edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Presence confirmed; the actuator was pulsed.
    Activated,
    /// Nobody present; the actuator stayed untouched.
    Denied,
    /// The edge arrived inside the debounce window and was suppressed.
    Debounced,
}

/// Debounced manual trigger bound to the presence store and the gateway.
pub struct ManualTrigger {
    store: Arc<PresenceStore>,
    gateway: Arc<GpioGateway>,
    debounce: Duration,
    last_edge: Mutex<Option<Instant>>,
}

impl ManualTrigger {
    /// Create a trigger with the given debounce window.
    pub fn new(store: Arc<PresenceStore>, gateway: Arc<GpioGateway>, debounce: Duration) -> Self {
        Self {
            store,
            gateway,
            debounce,
            last_edge: Mutex::new(None),
        }
    }

    /// Handle one trigger edge.
    pub async fn fire(&self) -> TriggerOutcome {
        {
            let mut last = self.last_edge.lock().await;
            let now = Instant::now();
            if last.is_some_and(|edge| now.saturating_duration_since(edge) < self.debounce) {
                debug!("trigger edge suppressed by debounce");
                return TriggerOutcome::Debounced;
            }
            *last = Some(now);
        }

        if self.store.global().await {
            info!("manual trigger accepted");
            self.gateway.activate().await;
            TriggerOutcome::Activated
        } else {
            info!("manual trigger denied, nobody present");
            TriggerOutcome::Denied
        }
    }
}
