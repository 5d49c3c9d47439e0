//! Application state shared across HTTP handlers.

use std::sync::Arc;

use doorman_core::{PresenceStore, ScanState};
use tokio::sync::watch;

use crate::trigger::ManualTrigger;

/// Shared application state, cheap to clone into handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<PresenceStore>,
    scanner_state: watch::Receiver<ScanState>,
    trigger: ManualTrigger,
}

impl AppState {
    /// Bundle the shared handles for the router.
    pub fn new(
        store: Arc<PresenceStore>,
        scanner_state: watch::Receiver<ScanState>,
        trigger: ManualTrigger,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                scanner_state,
                trigger,
            }),
        }
    }

    /// The shared presence store.
    pub fn store(&self) -> &PresenceStore {
        &self.inner.store
    }

    /// Current run-state of the passive scanner.
    pub fn scanner_state(&self) -> ScanState {
        *self.inner.scanner_state.borrow()
    }

    /// The manual trigger.
    pub fn trigger(&self) -> &ManualTrigger {
        &self.inner.trigger
    }
}
