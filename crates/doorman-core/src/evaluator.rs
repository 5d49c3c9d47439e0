//! Presence evaluation loop.
//!
//! Runs on a fixed period. Each cycle walks the device set in its configured
//! order and fuses passive sightings with on-demand active probes into a
//! debounced present/absent verdict per device, then publishes the global
//! flag and announces transitions through the actuation gateway.
//!
//! The verdict policy, per device and cycle:
//!
//! 1. Sighted within the grace period → `Present`, failures reset, no probe.
//! 2. Otherwise, probe only when the sighting is stale enough *and* the
//!    probe cooldown has elapsed. Hit → `Present`, sighting refreshed,
//!    failures reset. Miss → failures incremented (capped), `Absent`.
//! 3. Not eligible → previous verdict carries forward unchanged.
//!
//! Repeated failure therefore lands on `Absent`: absence denies actuation,
//! never the other way around.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DoormanConfig;
use crate::gateway::{ActuationGateway, BlinkRate, SignalPattern};
use crate::prober::DeviceProber;
use crate::store::{PresenceSnapshot, PresenceStore};
use crate::types::{DeviceObservation, PresenceState, ProbeOutcome, TrackedDevice};

/// Timing and announcement parameters for the evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Evaluation cycle period.
    pub cycle_period: Duration,
    /// Passive sighting grace window.
    pub grace_period: Duration,
    /// Staleness threshold for active probe eligibility.
    pub probe_trigger: Duration,
    /// Minimum spacing between probes of one device.
    pub probe_cooldown: Duration,
    /// Announcement on the transition to present.
    pub presence_signal: SignalPattern,
    /// Announcement on the transition to absent.
    pub absence_signal: SignalPattern,
    /// Indicator cadence while present.
    pub presence_blink: BlinkRate,
    /// Indicator cadence while absent.
    pub absence_blink: BlinkRate,
}

impl EvaluatorSettings {
    /// Derive evaluator settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &DoormanConfig) -> Self {
        let presence = &config.presence;
        let actuation = &config.actuation;
        Self {
            cycle_period: presence.cycle_period(),
            grace_period: presence.grace_period(),
            probe_trigger: presence.probe_trigger(),
            probe_cooldown: presence.probe_cooldown(),
            presence_signal: SignalPattern {
                count: actuation.presence_beep_count,
                pulse: Duration::from_millis(actuation.presence_beep_ms),
            },
            absence_signal: SignalPattern {
                count: actuation.absence_beep_count,
                pulse: Duration::from_millis(actuation.absence_beep_ms),
            },
            presence_blink: BlinkRate {
                on: Duration::from_millis(actuation.presence_blink_on_ms),
                off: Duration::from_millis(actuation.presence_blink_off_ms),
            },
            absence_blink: BlinkRate {
                on: Duration::from_millis(actuation.absence_blink_on_ms),
                off: Duration::from_millis(actuation.absence_blink_off_ms),
            },
        }
    }
}

/// The hysteresis-based presence evaluator.
///
/// Reads the shared store, decides per-device eligibility for active
/// probing, writes verdicts back, and publishes the global flag once per
/// completed cycle. A cycle cannot abort the loop: every fallible step
/// collapses to a value before it can escape.
pub struct PresenceEvaluator<P, G> {
    store: Arc<PresenceStore>,
    prober: P,
    gateway: G,
    settings: EvaluatorSettings,
    previous_global: Option<bool>,
}

impl<P: DeviceProber, G: ActuationGateway> PresenceEvaluator<P, G> {
    /// Create an evaluator over the given store.
    pub fn new(store: Arc<PresenceStore>, prober: P, gateway: G, settings: EvaluatorSettings) -> Self {
        Self {
            store,
            prober,
            gateway,
            settings,
            previous_global: None,
        }
    }

    /// Fixed-period evaluation loop, until `shutdown` flips.
    ///
    /// Sleeps the remainder of the period after each cycle. An overrunning
    /// cycle is logged and the next one starts immediately; there is no
    /// catch-up.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(period = ?self.settings.cycle_period, "presence evaluator started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cycle_start = Instant::now();
            self.run_cycle(cycle_start).await;

            let elapsed = cycle_start.elapsed();
            let Some(remaining) = self.settings.cycle_period.checked_sub(elapsed) else {
                warn!(
                    elapsed = ?elapsed,
                    period = ?self.settings.cycle_period,
                    "evaluation cycle overran its period"
                );
                continue;
            };
            tokio::select! {
                () = tokio::time::sleep(remaining) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("presence evaluator stopped");
    }

    /// Run one full evaluation cycle with `now` as its reference time.
    ///
    /// Exposed so the cycle logic can be driven deterministically; the
    /// production path is [`PresenceEvaluator::run`].
    pub async fn run_cycle(&mut self, now: Instant) {
        debug!("presence cycle started");
        let snapshot = self.store.snapshot().await;
        for status in &snapshot.devices {
            self.evaluate_device(&status.device, &status.observation, now)
                .await;
        }

        let verdicts = self.store.snapshot().await;
        let global = verdicts
            .devices
            .iter()
            .any(|status| status.observation.presence.is_present());
        self.store.publish_global(global).await;
        log_overview(&verdicts, global, now);

        if self.previous_global != Some(global) {
            self.announce_transition(global).await;
            self.previous_global = Some(global);
        }
    }

    async fn evaluate_device(
        &self,
        device: &TrackedDevice,
        observation: &DeviceObservation,
        now: Instant,
    ) {
        let address = &device.address;

        if observation.seen_within(now, self.settings.grace_period) {
            self.store.update_failures(address, true).await;
            self.store
                .set_presence(address, PresenceState::Present, ProbeOutcome::Skip)
                .await;
            return;
        }

        let stale = observation
            .last_seen
            .map_or(true, |t| now.saturating_duration_since(t) >= self.settings.probe_trigger);
        let cooled = observation
            .last_probe
            .map_or(true, |t| now.saturating_duration_since(t) >= self.settings.probe_cooldown);
        if !(stale && cooled) {
            self.store.mark_skipped(address).await;
            return;
        }

        debug!(address = %address, "active probe required");
        let probe_start = Instant::now();
        let hit = self.prober.probe(device).await;
        self.store
            .record_probe_result(address, probe_start, hit)
            .await;
        self.store.update_failures(address, hit).await;
        if hit {
            self.store
                .set_presence(address, PresenceState::Present, ProbeOutcome::Hit)
                .await;
        } else {
            debug!(address = %address, "active probe found no presence");
            self.store
                .set_presence(address, PresenceState::Absent, ProbeOutcome::Miss)
                .await;
        }
    }

    async fn announce_transition(&self, present: bool) {
        if present {
            info!("global presence changed: present");
            self.gateway
                .set_indicator_rate(
                    self.settings.presence_blink.on,
                    self.settings.presence_blink.off,
                )
                .await;
            self.gateway
                .signal(
                    self.settings.presence_signal.count,
                    self.settings.presence_signal.pulse,
                )
                .await;
        } else {
            info!("global presence changed: absent");
            self.gateway
                .set_indicator_rate(
                    self.settings.absence_blink.on,
                    self.settings.absence_blink.off,
                )
                .await;
            self.gateway
                .signal(
                    self.settings.absence_signal.count,
                    self.settings.absence_signal.pulse,
                )
                .await;
        }
    }
}

fn log_overview(snapshot: &PresenceSnapshot, global: bool, now: Instant) {
    let summary: Vec<String> = snapshot
        .devices
        .iter()
        .map(|status| {
            let seen = status.observation.last_seen.map_or_else(
                || "never seen".to_string(),
                |t| format!("{:.1}s ago", now.saturating_duration_since(t).as_secs_f64()),
            );
            format!(
                "{} {:?} ({seen}, {:?})",
                status.device.display_name(),
                status.observation.presence,
                status.observation.last_result
            )
        })
        .collect();
    info!(global, "presence overview: {}", summary.join(" | "));
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::types::DeviceAddress;

    struct ScriptedProber {
        results: Mutex<VecDeque<bool>>,
        calls: Mutex<Vec<DeviceAddress>>,
    }

    impl ScriptedProber {
        fn new(results: impl IntoIterator<Item = bool>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl DeviceProber for ScriptedProber {
        async fn probe(&self, device: &TrackedDevice) -> bool {
            self.calls.lock().unwrap().push(device.address.clone());
            self.results.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        signals: Mutex<Vec<SignalPattern>>,
        rates: Mutex<Vec<BlinkRate>>,
    }

    impl ActuationGateway for RecordingGateway {
        async fn activate(&self) {}

        async fn set_indicator_rate(&self, on: Duration, off: Duration) {
            self.rates.lock().unwrap().push(BlinkRate { on, off });
        }

        async fn signal(&self, count: u32, pulse: Duration) {
            self.signals.lock().unwrap().push(SignalPattern { count, pulse });
        }
    }

    fn device(address: &str) -> TrackedDevice {
        TrackedDevice {
            address: address.parse().unwrap(),
            label: None,
        }
    }

    fn settings() -> EvaluatorSettings {
        EvaluatorSettings {
            cycle_period: Duration::from_millis(50),
            grace_period: Duration::from_secs(60),
            probe_trigger: Duration::ZERO,
            probe_cooldown: Duration::ZERO,
            presence_signal: SignalPattern {
                count: 2,
                pulse: Duration::from_millis(1),
            },
            absence_signal: SignalPattern {
                count: 3,
                pulse: Duration::from_millis(1),
            },
            presence_blink: BlinkRate {
                on: Duration::from_millis(200),
                off: Duration::from_millis(700),
            },
            absence_blink: BlinkRate {
                on: Duration::from_millis(200),
                off: Duration::from_millis(1200),
            },
        }
    }

    fn evaluator(
        store: &Arc<PresenceStore>,
        prober: &Arc<ScriptedProber>,
        gateway: &Arc<RecordingGateway>,
        settings: EvaluatorSettings,
    ) -> PresenceEvaluator<Arc<ScriptedProber>, Arc<RecordingGateway>> {
        PresenceEvaluator::new(
            Arc::clone(store),
            Arc::clone(prober),
            Arc::clone(gateway),
            settings,
        )
    }

    #[tokio::test]
    async fn first_cycle_probes_every_unseen_device() {
        let store = Arc::new(PresenceStore::new(
            [device("0C:15:63:DF:61:2F"), device("80:04:5F:A2:66:57")],
            3,
        ));
        let prober = ScriptedProber::new([true, false]);
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(&store, &prober, &gateway, settings());

        evaluator.run_cycle(Instant::now()).await;

        assert_eq!(prober.call_count(), 2);
        let snapshot = store.snapshot().await;

        let first = &snapshot.devices[0].observation;
        assert_eq!(first.presence, PresenceState::Present);
        assert_eq!(first.last_result, ProbeOutcome::Hit);
        assert!(first.last_seen.is_some());
        assert_eq!(first.consecutive_failures, 0);

        let second = &snapshot.devices[1].observation;
        assert_eq!(second.presence, PresenceState::Absent);
        assert_eq!(second.last_result, ProbeOutcome::Miss);
        assert_eq!(second.last_seen, None);
        assert_eq!(second.consecutive_failures, 1);

        // global == OR(present) after the completed cycle
        assert!(store.global().await);
    }

    #[tokio::test]
    async fn sighting_within_grace_skips_the_prober() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 3));
        let address: DeviceAddress = "0C:15:63:DF:61:2F".parse().unwrap();
        let prober = ScriptedProber::new([]);
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(&store, &prober, &gateway, settings());

        // accumulated failures from earlier misses
        store.update_failures(&address, false).await;
        store.update_failures(&address, false).await;

        let now = Instant::now();
        store.record_sighting(&address, now).await;
        evaluator.run_cycle(now + Duration::from_secs(10)).await;

        assert_eq!(prober.call_count(), 0);
        let observation = store.snapshot().await.devices[0].observation.clone();
        assert_eq!(observation.presence, PresenceState::Present);
        assert_eq!(observation.last_result, ProbeOutcome::Skip);
        assert_eq!(observation.consecutive_failures, 0);
        assert!(store.global().await);
    }

    #[tokio::test]
    async fn cooldown_carries_the_previous_verdict_forward() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 3));
        let prober = ScriptedProber::new([true]);
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(
            &store,
            &prober,
            &gateway,
            EvaluatorSettings {
                grace_period: Duration::ZERO,
                probe_cooldown: Duration::from_secs(300),
                ..settings()
            },
        );

        let first = Instant::now();
        evaluator.run_cycle(first).await;
        assert_eq!(prober.call_count(), 1);

        // within the cooldown: no second probe, verdict unchanged
        evaluator.run_cycle(first + Duration::from_secs(5)).await;
        assert_eq!(prober.call_count(), 1);

        let observation = store.snapshot().await.devices[0].observation.clone();
        assert_eq!(observation.presence, PresenceState::Present);
        assert_eq!(observation.last_result, ProbeOutcome::Skip);
    }

    #[tokio::test]
    async fn failure_streak_is_capped_and_stays_absent() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 2));
        let prober = ScriptedProber::new([]); // always false
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(
            &store,
            &prober,
            &gateway,
            EvaluatorSettings {
                grace_period: Duration::ZERO,
                ..settings()
            },
        );

        let base = Instant::now();
        for cycle in 0..6 {
            evaluator
                .run_cycle(base + Duration::from_secs(cycle * 60))
                .await;
        }

        let observation = store.snapshot().await.devices[0].observation.clone();
        assert_eq!(observation.presence, PresenceState::Absent);
        // max_failures = 2, so the counter parks at 3
        assert_eq!(observation.consecutive_failures, 3);
        assert!(!store.global().await);

        // six absent cycles announce the initial verdict exactly once
        assert_eq!(gateway.signals.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn each_transition_emits_exactly_one_signal() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 3));
        let prober = ScriptedProber::new([false, true]);
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(
            &store,
            &prober,
            &gateway,
            EvaluatorSettings {
                grace_period: Duration::from_secs(120),
                ..settings()
            },
        );

        let base = Instant::now();
        // cycle 1: miss -> absent (initial announcement)
        evaluator.run_cycle(base).await;
        // cycle 2: hit -> present
        evaluator.run_cycle(base + Duration::from_secs(60)).await;
        // cycle 3: inside the grace window -> still present, no announcement
        evaluator.run_cycle(base + Duration::from_secs(61)).await;

        let signals = gateway.signals.lock().unwrap().clone();
        assert_eq!(
            signals,
            vec![
                SignalPattern {
                    count: 3,
                    pulse: Duration::from_millis(1)
                },
                SignalPattern {
                    count: 2,
                    pulse: Duration::from_millis(1)
                },
            ]
        );

        // the indicator was retuned alongside each announcement
        let rates = gateway.rates.lock().unwrap().clone();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[1].off, Duration::from_millis(700));
    }

    #[tokio::test]
    async fn probe_hit_refreshes_the_sighting() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 3));
        let prober = ScriptedProber::new([true]);
        let gateway = Arc::new(RecordingGateway::default());
        let mut evaluator = evaluator(&store, &prober, &gateway, settings());

        let before = Instant::now();
        evaluator.run_cycle(before).await;

        let observation = store.snapshot().await.devices[0].observation.clone();
        let seen = observation.last_seen.expect("hit must refresh last_seen");
        assert!(seen >= before);
        assert_eq!(observation.last_probe, Some(seen));
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let store = Arc::new(PresenceStore::new([device("0C:15:63:DF:61:2F")], 3));
        let prober = ScriptedProber::new([]);
        let gateway = Arc::new(RecordingGateway::default());
        let evaluator = evaluator(&store, &prober, &gateway, settings());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(evaluator.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("evaluator should stop promptly")
            .unwrap();

        // at least the first cycle ran and published a verdict
        assert!(store.snapshot().await.devices[0].observation.last_result != ProbeOutcome::Never);
    }
}
