//! Shared observation store.
//!
//! All cross-worker communication goes through this table: the passive
//! scanner records sightings, the evaluator records probe results and
//! verdicts, and the status interface reads snapshots. Every operation takes
//! the single lock, mutates or copies, and releases it; the lock is never
//! held across I/O or sleeps.

use std::time::Instant;

use tokio::sync::RwLock;

use crate::types::{DeviceAddress, DeviceObservation, PresenceState, ProbeOutcome, TrackedDevice};

/// A device together with its current observation, as captured by
/// [`PresenceStore::snapshot`].
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    /// The tracked device.
    pub device: TrackedDevice,
    /// Its observation at snapshot time.
    pub observation: DeviceObservation,
}

/// Point-in-time copy of the whole store.
#[derive(Debug, Clone)]
pub struct PresenceSnapshot {
    /// All devices in their configured evaluation order.
    pub devices: Vec<DeviceStatus>,
    /// The global flag as of the last completed evaluation cycle.
    pub global: bool,
}

struct StoreInner {
    devices: Vec<DeviceStatus>,
    global: bool,
}

/// Mutex-guarded table of per-device observations plus the derived global
/// presence flag.
///
/// Observations are created once at startup for the fixed device set and live
/// for the process lifetime. `presence`, `last_result` and the global flag
/// are written only by the evaluator; sightings and probe bookkeeping may be
/// written by the scanner and evaluator respectively. Writes for unknown
/// addresses are ignored.
pub struct PresenceStore {
    inner: RwLock<StoreInner>,
    failure_cap: u32,
}

impl PresenceStore {
    /// Create a store for a fixed device set.
    ///
    /// `max_failures` bounds the per-device failure counter at
    /// `max_failures + 1`.
    pub fn new(devices: impl IntoIterator<Item = TrackedDevice>, max_failures: u32) -> Self {
        let devices = devices
            .into_iter()
            .map(|device| DeviceStatus {
                device,
                observation: DeviceObservation::new(),
            })
            .collect();
        Self {
            inner: RwLock::new(StoreInner {
                devices,
                global: false,
            }),
            failure_cap: max_failures.saturating_add(1),
        }
    }

    /// Point-in-time copy of all observations and the global flag.
    pub async fn snapshot(&self) -> PresenceSnapshot {
        let inner = self.inner.read().await;
        PresenceSnapshot {
            devices: inner.devices.clone(),
            global: inner.global,
        }
    }

    /// The global flag as of the last completed evaluation cycle.
    pub async fn global(&self) -> bool {
        self.inner.read().await.global
    }

    /// Record a sighting of `address` at `at`. `last_seen` only ever
    /// advances; a stale timestamp cannot move it backwards.
    pub async fn record_sighting(&self, address: &DeviceAddress, at: Instant) {
        let mut inner = self.inner.write().await;
        if let Some(obs) = observation_mut(&mut inner, address) {
            obs.last_seen = Some(obs.last_seen.map_or(at, |prev| prev.max(at)));
        }
    }

    /// Record that an active probe was started at `at`; a successful probe
    /// also counts as a sighting.
    pub async fn record_probe_result(&self, address: &DeviceAddress, at: Instant, success: bool) {
        let mut inner = self.inner.write().await;
        if let Some(obs) = observation_mut(&mut inner, address) {
            obs.last_probe = Some(at);
            if success {
                obs.last_seen = Some(obs.last_seen.map_or(at, |prev| prev.max(at)));
            }
        }
    }

    /// Reset the failure counter on success, otherwise increment it, capped
    /// at `max_failures + 1`.
    pub async fn update_failures(&self, address: &DeviceAddress, success: bool) {
        let mut inner = self.inner.write().await;
        if let Some(obs) = observation_mut(&mut inner, address) {
            obs.consecutive_failures = if success {
                0
            } else {
                obs.consecutive_failures
                    .saturating_add(1)
                    .min(self.failure_cap)
            };
        }
    }

    /// Write a verdict for one device. Called only by the evaluator.
    pub async fn set_presence(
        &self,
        address: &DeviceAddress,
        presence: PresenceState,
        outcome: ProbeOutcome,
    ) {
        let mut inner = self.inner.write().await;
        if let Some(obs) = observation_mut(&mut inner, address) {
            obs.presence = presence;
            obs.last_result = outcome;
        }
    }

    /// Record that this cycle neither probed the device nor changed its
    /// verdict. Called only by the evaluator.
    pub async fn mark_skipped(&self, address: &DeviceAddress) {
        let mut inner = self.inner.write().await;
        if let Some(obs) = observation_mut(&mut inner, address) {
            obs.last_result = ProbeOutcome::Skip;
        }
    }

    /// Publish the global flag. Called once per completed evaluation cycle.
    pub async fn publish_global(&self, present: bool) {
        self.inner.write().await.global = present;
    }
}

fn observation_mut<'a>(
    inner: &'a mut StoreInner,
    address: &DeviceAddress,
) -> Option<&'a mut DeviceObservation> {
    inner
        .devices
        .iter_mut()
        .find(|slot| &slot.device.address == address)
        .map(|slot| &mut slot.observation)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store_with(addresses: &[&str]) -> PresenceStore {
        PresenceStore::new(
            addresses.iter().map(|a| TrackedDevice {
                address: a.parse().unwrap(),
                label: None,
            }),
            3,
        )
    }

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn sighting_never_moves_backwards() {
        let store = store_with(&["0C:15:63:DF:61:2F"]);
        let address = addr("0C:15:63:DF:61:2F");
        let base = Instant::now();
        let later = base + Duration::from_secs(5);

        store.record_sighting(&address, later).await;
        store.record_sighting(&address, base).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.devices[0].observation.last_seen, Some(later));
    }

    #[tokio::test]
    async fn failures_reset_on_success_and_cap_on_failure() {
        let store = store_with(&["0C:15:63:DF:61:2F"]);
        let address = addr("0C:15:63:DF:61:2F");

        for _ in 0..10 {
            store.update_failures(&address, false).await;
        }
        let snapshot = store.snapshot().await;
        // cap is max_failures + 1
        assert_eq!(snapshot.devices[0].observation.consecutive_failures, 4);

        store.update_failures(&address, true).await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.devices[0].observation.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn successful_probe_advances_last_seen() {
        let store = store_with(&["0C:15:63:DF:61:2F"]);
        let address = addr("0C:15:63:DF:61:2F");
        let at = Instant::now();

        store.record_probe_result(&address, at, false).await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.devices[0].observation.last_probe, Some(at));
        assert_eq!(snapshot.devices[0].observation.last_seen, None);

        store.record_probe_result(&address, at, true).await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.devices[0].observation.last_seen, Some(at));
    }

    #[tokio::test]
    async fn unknown_address_is_ignored() {
        let store = store_with(&["0C:15:63:DF:61:2F"]);
        let stranger = addr("FF:FF:FF:FF:FF:FF");

        store.record_sighting(&stranger, Instant::now()).await;
        store.update_failures(&stranger, false).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(snapshot.devices[0].observation.last_seen, None);
    }

    #[tokio::test]
    async fn snapshot_preserves_configured_order() {
        let store = store_with(&["0C:15:63:DF:61:2F", "80:04:5F:A2:66:57"]);
        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot.devices[0].device.address.as_str(),
            "0C:15:63:DF:61:2F"
        );
        assert_eq!(
            snapshot.devices[1].device.address.as_str(),
            "80:04:5F:A2:66:57"
        );
    }

    #[tokio::test]
    async fn global_flag_is_published_value() {
        let store = store_with(&["0C:15:63:DF:61:2F"]);
        assert!(!store.global().await);
        store.publish_global(true).await;
        assert!(store.global().await);
        assert!(store.snapshot().await.global);
    }
}
