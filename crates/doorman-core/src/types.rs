//! Core domain types: tracked devices, observation state, probe outcomes.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}$").expect("valid regex"));

/// Pattern for pulling a 6-octet colon-hex address out of free-form scanner output.
pub(crate) static ADDRESS_EXTRACT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[0-9a-f]{2}(?::[0-9a-f]{2}){5}").expect("valid regex"));

/// A Bluetooth hardware address in canonical form (uppercase, colon-separated).
///
/// Construction goes through [`FromStr`], which validates and canonicalizes,
/// so two `DeviceAddress` values compare equal regardless of the case they
/// were written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// The canonical string form, e.g. `0C:15:63:DF:61:2F`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if ADDRESS_RE.is_match(trimmed) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidAddress(s.to_string()))
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error returned when a string is not a 6-octet colon-hex hardware address.
#[derive(Debug, Clone, thiserror::Error)]
#[error("not a valid hardware address: '{0}'")]
pub struct InvalidAddress(pub String);

/// One wireless tag the system watches for. The device set is fixed at
/// startup; there is no dynamic add/remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDevice {
    /// Hardware address of the tag.
    pub address: DeviceAddress,

    /// Optional human-readable label shown in logs and status output.
    #[serde(default)]
    pub label: Option<String>,
}

impl TrackedDevice {
    /// Label if configured, otherwise the address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

/// Per-device presence verdict. `Unknown` only exists before the first
/// completed evaluation cycle; afterwards the evaluator always decides
/// `Present` or `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    /// Not evaluated yet.
    Unknown,
    /// The device is considered nearby.
    Present,
    /// The device is considered away.
    Absent,
}

impl PresenceState {
    /// Whether this state counts toward the global presence flag.
    #[must_use]
    pub fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }
}

/// Outcome of the most recent evaluation step for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// Never evaluated.
    Never,
    /// An active probe confirmed the device.
    Hit,
    /// An active probe found nothing.
    Miss,
    /// Probing was skipped (passive sighting inside the grace period, or
    /// the staleness/cooldown gate was not open).
    Skip,
}

/// Everything the engine knows about one tracked device.
///
/// Timestamps are monotonic [`Instant`]s; `None` means "never". `last_seen`
/// only ever advances, and `consecutive_failures` is capped by the store.
#[derive(Debug, Clone)]
pub struct DeviceObservation {
    /// Most recent sighting, passive or probe-confirmed.
    pub last_seen: Option<Instant>,

    /// When the last active probe was started.
    pub last_probe: Option<Instant>,

    /// Consecutive failed probes, capped at `max_failures + 1`.
    pub consecutive_failures: u32,

    /// Current verdict; mutated only by the evaluator.
    pub presence: PresenceState,

    /// Outcome of the most recent evaluation step.
    pub last_result: ProbeOutcome,
}

impl DeviceObservation {
    pub(crate) fn new() -> Self {
        Self {
            last_seen: None,
            last_probe: None,
            consecutive_failures: 0,
            presence: PresenceState::Unknown,
            last_result: ProbeOutcome::Never,
        }
    }

    /// Whether the device was sighted within `window` of `now`.
    #[must_use]
    pub fn seen_within(&self, now: Instant, window: Duration) -> bool {
        self.last_seen
            .is_some_and(|t| now.saturating_duration_since(t) <= window)
    }
}
