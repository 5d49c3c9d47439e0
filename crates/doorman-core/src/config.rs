//! Application configuration management.
//!
//! Everything tunable lives in one TOML file: the tracked device list, the
//! evaluation timing knobs, the discovery/probe commands, and the actuation
//! hardware parameters. Defaults match a small Raspberry Pi door installation
//! with a relay, an indicator LED and a piezo buzzer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DoormanError, Result};
use crate::types::TrackedDevice;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DoormanConfig {
    /// Wireless tags whose proximity opens the door. Fixed at startup.
    pub devices: Vec<TrackedDevice>,

    /// Presence evaluation timing.
    pub presence: PresenceConfig,

    /// Passive discovery process supervision.
    pub scanner: ScannerConfig,

    /// Active existence probing.
    pub probe: ProbeConfig,

    /// Relay, buzzer and indicator behavior.
    pub actuation: ActuationConfig,

    /// GPIO wiring.
    pub gpio: GpioConfig,

    /// HTTP status interface.
    pub server: ServerConfig,
}

/// Timing knobs for the presence evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Evaluation cycle period in seconds.
    pub cycle_period_secs: u64,

    /// How long after a sighting a device still counts as present without
    /// probing.
    pub grace_period_secs: u64,

    /// Elapsed time since the last sighting after which active probing
    /// becomes eligible.
    pub probe_trigger_secs: u64,

    /// Minimum time between active probes of the same device.
    pub probe_cooldown_secs: u64,

    /// Failure counter cap: `consecutive_failures` never exceeds this + 1.
    pub max_failures: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            cycle_period_secs: 12,
            grace_period_secs: 60,
            probe_trigger_secs: 30,
            probe_cooldown_secs: 15,
            max_failures: 3,
        }
    }
}

impl PresenceConfig {
    /// Cycle period as a [`Duration`].
    #[must_use]
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs(self.cycle_period_secs)
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Probe trigger threshold as a [`Duration`].
    #[must_use]
    pub fn probe_trigger(&self) -> Duration {
        Duration::from_secs(self.probe_trigger_secs)
    }

    /// Probe cooldown as a [`Duration`].
    #[must_use]
    pub fn probe_cooldown(&self) -> Duration {
        Duration::from_secs(self.probe_cooldown_secs)
    }
}

/// Supervision parameters for the external discovery process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Command line of the discovery process. `stdbuf -oL` keeps the child's
    /// output line-buffered through the pipe.
    pub command: Vec<String>,

    /// Newline-terminated commands written to the child's stdin after launch.
    pub setup_commands: Vec<String>,

    /// Commands written to stdin when shutting the child down.
    pub stop_commands: Vec<String>,

    /// Fixed delay before relaunching a died discovery process, in seconds.
    pub restart_delay_secs: u64,

    /// How long to wait for the child to exit after the stop commands before
    /// killing it, in milliseconds.
    pub stop_grace_ms: u64,

    /// Per-command write timeout for stdin control commands, in milliseconds.
    pub command_timeout_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            command: vec!["stdbuf".into(), "-oL".into(), "bluetoothctl".into()],
            setup_commands: vec![
                "set le on".into(),
                "set duplicate-data true".into(),
                "scan on".into(),
            ],
            stop_commands: vec!["scan off".into(), "quit".into()],
            restart_delay_secs: 4,
            stop_grace_ms: 2000,
            command_timeout_ms: 1000,
        }
    }
}

impl ScannerConfig {
    /// Restart backoff as a [`Duration`].
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Stop grace period as a [`Duration`].
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Control command write timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// One escalation stage of the active probe schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeStage {
    /// Wall-clock timeout for a single existence check, in milliseconds.
    pub timeout_ms: u64,

    /// How many attempts to make at this stage.
    pub attempts: u32,

    /// Pause between attempts and before the next stage, in milliseconds.
    pub pause_ms: u64,
}

impl ProbeStage {
    /// Attempt timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inter-attempt pause as a [`Duration`].
    #[must_use]
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// Active prober configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Ordered escalation schedule. Cheap, short attempts first.
    pub stages: Vec<ProbeStage>,

    /// Existence check command; the target address is appended as the last
    /// argument.
    pub command: Vec<String>,

    /// Substrings that mark the primary command's output as a confirmed hit.
    /// An empty list falls back to "any non-empty output".
    pub success_markers: Vec<String>,

    /// Optional second existence command tried when the primary attempt
    /// fails; success is a zero exit status with non-empty output.
    pub fallback_command: Option<Vec<String>>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stages: vec![
                ProbeStage {
                    timeout_ms: 1500,
                    attempts: 1,
                    pause_ms: 300,
                },
                ProbeStage {
                    timeout_ms: 3000,
                    attempts: 2,
                    pause_ms: 600,
                },
            ],
            command: vec!["bluetoothctl".into(), "info".into()],
            success_markers: vec!["Connected: yes".into(), "RSSI:".into()],
            fallback_command: Some(vec!["hcitool".into(), "name".into()]),
        }
    }
}

/// Relay, buzzer and indicator parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// How long the relay stays energized per activation, in milliseconds.
    pub relay_pulse_ms: u64,

    /// Buzzer pulses emitted on the transition to present.
    pub presence_beep_count: u32,

    /// Length of each presence beep pulse, in milliseconds.
    pub presence_beep_ms: u64,

    /// Buzzer pulses emitted on the transition to absent.
    pub absence_beep_count: u32,

    /// Length of each absence beep pulse, in milliseconds.
    pub absence_beep_ms: u64,

    /// Indicator on-time while someone is present, in milliseconds.
    pub presence_blink_on_ms: u64,

    /// Indicator off-time while someone is present, in milliseconds.
    pub presence_blink_off_ms: u64,

    /// Indicator on-time while nobody is present, in milliseconds.
    pub absence_blink_on_ms: u64,

    /// Indicator off-time while nobody is present, in milliseconds.
    pub absence_blink_off_ms: u64,

    /// Manual trigger debounce window, in milliseconds.
    pub trigger_debounce_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            relay_pulse_ms: 500,
            presence_beep_count: 2,
            presence_beep_ms: 100,
            absence_beep_count: 2,
            absence_beep_ms: 100,
            presence_blink_on_ms: 200,
            presence_blink_off_ms: 700,
            absence_blink_on_ms: 200,
            absence_blink_off_ms: 1200,
            trigger_debounce_ms: 200,
        }
    }
}

impl ActuationConfig {
    /// Relay pulse length as a [`Duration`].
    #[must_use]
    pub fn relay_pulse(&self) -> Duration {
        Duration::from_millis(self.relay_pulse_ms)
    }

    /// Trigger debounce window as a [`Duration`].
    #[must_use]
    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_millis(self.trigger_debounce_ms)
    }
}

/// GPIO wiring for the physical outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// Root of the sysfs GPIO tree. Tests point this at a temp directory.
    pub base_dir: PathBuf,

    /// Indicator LED pin (BCM numbering).
    pub led_pin: u32,

    /// Door relay pin.
    pub relay_pin: u32,

    /// Buzzer pin.
    pub buzzer_pin: u32,

    /// The relay board is driven active-low.
    pub relay_active_low: bool,

    /// The buzzer is driven active-low.
    pub buzzer_active_low: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/sys/class/gpio"),
            led_pin: 23,
            relay_pin: 26,
            buzzer_pin: 19,
            relay_active_low: true,
            buzzer_active_low: true,
        }
    }
}

/// HTTP status interface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the status API binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

impl DoormanConfig {
    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DoormanError::ConfigNotFound`] if the file does not exist,
    /// [`DoormanError::ConfigParse`] if it is not valid TOML, and
    /// [`DoormanError::ConfigInvalid`] if validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DoormanError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| DoormanError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| DoormanError::ConfigParse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default configuration file location.
    ///
    /// On the target hardware: `/etc/doorman/config.toml`.
    /// For development on other platforms: the per-user config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/doorman/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "doorman")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("doorman.toml"))
        }
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// All problems are collected and reported together.
    ///
    /// # Errors
    ///
    /// Returns [`DoormanError::ConfigInvalid`] listing every failed field.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.devices.is_empty() {
            problems.push("devices: at least one tracked device is required".to_string());
        }
        if self.presence.cycle_period_secs == 0 {
            problems.push("presence.cycle_period_secs: must be greater than zero".to_string());
        }
        if self.scanner.command.is_empty() {
            problems.push("scanner.command: must not be empty".to_string());
        }
        if self.probe.command.is_empty() {
            problems.push("probe.command: must not be empty".to_string());
        }
        if self.probe.stages.is_empty() {
            problems.push("probe.stages: at least one stage is required".to_string());
        }
        for (index, stage) in self.probe.stages.iter().enumerate() {
            if stage.attempts == 0 {
                problems.push(format!("probe.stages[{index}].attempts: must be at least 1"));
            }
            if stage.timeout_ms == 0 {
                problems.push(format!(
                    "probe.stages[{index}].timeout_ms: must be greater than zero"
                ));
            }
        }
        if let Some(fallback) = &self.probe.fallback_command {
            if fallback.is_empty() {
                problems.push("probe.fallback_command: must not be empty when set".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DoormanError::ConfigInvalid(problems.join("; ")))
        }
    }
}
