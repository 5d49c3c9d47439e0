//! Actuation capability contract.
//!
//! The engine never touches hardware directly; it drives whatever implements
//! [`ActuationGateway`]. The real implementation lives with the binary (GPIO
//! relay, LED, buzzer); tests substitute a recording double.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Capability set consumed by the presence engine.
pub trait ActuationGateway: Send + Sync {
    /// Pulse the actuator for its configured duration, then release it.
    fn activate(&self) -> impl Future<Output = ()> + Send;

    /// Reconfigure the repeating indicator blink pattern run by an
    /// independent task.
    fn set_indicator_rate(&self, on: Duration, off: Duration) -> impl Future<Output = ()> + Send;

    /// Emit `count` on/off pulses. Blocks the caller for
    /// `count * 2 * pulse`.
    fn signal(&self, count: u32, pulse: Duration) -> impl Future<Output = ()> + Send;
}

impl<G: ActuationGateway> ActuationGateway for Arc<G> {
    fn activate(&self) -> impl Future<Output = ()> + Send {
        G::activate(self)
    }

    fn set_indicator_rate(&self, on: Duration, off: Duration) -> impl Future<Output = ()> + Send {
        G::set_indicator_rate(self, on, off)
    }

    fn signal(&self, count: u32, pulse: Duration) -> impl Future<Output = ()> + Send {
        G::signal(self, count, pulse)
    }
}

/// An audible transition announcement: `count` pulses of `pulse` length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPattern {
    /// Number of on/off pulses.
    pub count: u32,
    /// Length of each half-pulse.
    pub pulse: Duration,
}

/// An indicator blink cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkRate {
    /// Time the indicator stays on.
    pub on: Duration,
    /// Time the indicator stays off.
    pub off: Duration,
}
