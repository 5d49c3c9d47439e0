//! sysfs GPIO outputs and the hardware actuation gateway.
//!
//! The relay, buzzer and indicator LED are plain digital outputs driven
//! through the sysfs GPIO tree. The root of that tree is configurable, so
//! tests (and development machines without GPIO hardware) point it at an
//! ordinary directory and the same write path applies.
//!
//! Write failures on an individual line are logged and swallowed: a flaky
//! LED must never take down the workers driving it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use doorman_core::{ActuationConfig, ActuationGateway, BlinkRate, GpioConfig};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One exported GPIO line configured as an output.
#[derive(Debug, Clone)]
pub struct OutputLine {
    value_path: PathBuf,
    active_low: bool,
}

impl OutputLine {
    /// Export `pin` under `base_dir`, configure it as an output and release
    /// it.
    ///
    /// On a real sysfs root the export write makes the kernel create the
    /// line directory; on a plain directory (tests, development) the
    /// directory is created directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be set up or written.
    pub fn open(base_dir: &Path, pin: u32, active_low: bool) -> io::Result<Self> {
        let line_dir = base_dir.join(format!("gpio{pin}"));
        if !line_dir.exists() {
            // re-exporting an already exported pin fails; only the outcome
            // (line_dir present) matters
            let _ = std::fs::write(base_dir.join("export"), pin.to_string());
        }
        if !line_dir.exists() {
            std::fs::create_dir_all(&line_dir)?;
        }
        std::fs::write(line_dir.join("direction"), "out")?;

        let line = Self {
            value_path: line_dir.join("value"),
            active_low,
        };
        line.set(false)?;
        Ok(line)
    }

    /// Drive the line. `on` is the logical state; the electrical level
    /// honors `active_low`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value file cannot be written.
    pub fn set(&self, on: bool) -> io::Result<()> {
        let level = if on != self.active_low { "1" } else { "0" };
        std::fs::write(&self.value_path, level)
    }

    fn set_logged(&self, on: bool) {
        if let Err(err) = self.set(on) {
            warn!(path = %self.value_path.display(), error = %err, "GPIO write failed");
        }
    }
}

/// Hardware implementation of the [`ActuationGateway`] contract.
pub struct GpioGateway {
    relay: OutputLine,
    buzzer: OutputLine,
    relay_pulse: Duration,
    blink_tx: watch::Sender<BlinkRate>,
}

impl GpioGateway {
    /// Open the relay, buzzer and LED lines and return the gateway together
    /// with the indicator task that owns the LED.
    ///
    /// # Errors
    ///
    /// Returns an error if any GPIO line cannot be set up.
    pub fn new(
        gpio: &GpioConfig,
        actuation: &ActuationConfig,
        initial_rate: BlinkRate,
    ) -> io::Result<(Self, IndicatorTask)> {
        let relay = OutputLine::open(&gpio.base_dir, gpio.relay_pin, gpio.relay_active_low)?;
        let buzzer = OutputLine::open(&gpio.base_dir, gpio.buzzer_pin, gpio.buzzer_active_low)?;
        let led = OutputLine::open(&gpio.base_dir, gpio.led_pin, false)?;

        let (blink_tx, blink_rx) = watch::channel(initial_rate);
        Ok((
            Self {
                relay,
                buzzer,
                relay_pulse: actuation.relay_pulse(),
                blink_tx,
            },
            IndicatorTask {
                led,
                rate: blink_rx,
            },
        ))
    }
}

impl ActuationGateway for GpioGateway {
    async fn activate(&self) {
        info!(pulse = ?self.relay_pulse, "actuator pulse");
        self.relay.set_logged(true);
        tokio::time::sleep(self.relay_pulse).await;
        self.relay.set_logged(false);
    }

    async fn set_indicator_rate(&self, on: Duration, off: Duration) {
        debug!(?on, ?off, "indicator rate changed");
        self.blink_tx.send_replace(BlinkRate { on, off });
    }

    async fn signal(&self, count: u32, pulse: Duration) {
        for _ in 0..count {
            self.buzzer.set_logged(true);
            tokio::time::sleep(pulse).await;
            self.buzzer.set_logged(false);
            tokio::time::sleep(pulse).await;
        }
    }
}

/// Independent blink loop driving the indicator LED.
///
/// Picks up rate changes published through
/// [`ActuationGateway::set_indicator_rate`] at the next blink edge.
pub struct IndicatorTask {
    led: OutputLine,
    rate: watch::Receiver<BlinkRate>,
}

impl IndicatorTask {
    /// Blink until `shutdown` flips, then leave the LED dark.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let rate = *self.rate.borrow();
            self.led.set_logged(true);
            tokio::select! {
                () = tokio::time::sleep(rate.on) => {}
                _ = shutdown.changed() => break,
            }
            self.led.set_logged(false);
            tokio::select! {
                () = tokio::time::sleep(rate.off) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.led.set_logged(false);
        debug!("indicator task stopped");
    }
}
