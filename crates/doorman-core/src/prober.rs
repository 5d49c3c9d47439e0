//! On-demand active existence probing.
//!
//! One probe walks a configured escalation schedule: cheap short attempts
//! first, longer ones only once those fail, so the common case stays fast
//! while the worst case stays bounded. Every attempt is a one-shot external
//! command with an enforced wall-clock timeout; a hung check can never stall
//! the evaluator. All failure modes — timeout, non-zero exit, empty output,
//! spawn error — collapse to `false` and are never surfaced as errors.

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::types::TrackedDevice;

/// Seam between the evaluator and whatever performs existence checks.
pub trait DeviceProber: Send + Sync {
    /// Check whether `device` is reachable right now.
    fn probe(&self, device: &TrackedDevice) -> impl Future<Output = bool> + Send;
}

impl<P: DeviceProber> DeviceProber for Arc<P> {
    fn probe(&self, device: &TrackedDevice) -> impl Future<Output = bool> + Send {
        P::probe(self, device)
    }
}

/// Prober that shells out to external existence-check commands.
#[derive(Debug, Clone)]
pub struct ShellProber {
    config: ProbeConfig,
}

impl ShellProber {
    /// Create a prober from its configuration.
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    async fn attempt(&self, device: &TrackedDevice, timeout: Duration) -> bool {
        if let Some(output) =
            run_bounded(&self.config.command, device.address.as_str(), timeout).await
        {
            if output.status.success() && marker_match(&output.stdout, &self.config.success_markers)
            {
                debug!(address = %device.address, "active probe hit");
                return true;
            }
        }

        if let Some(fallback) = &self.config.fallback_command {
            if let Some(output) = run_bounded(fallback, device.address.as_str(), timeout).await {
                if output.status.success() && !output.stdout.is_empty() {
                    debug!(address = %device.address, "active probe hit via fallback");
                    return true;
                }
            }
        }

        false
    }
}

impl DeviceProber for ShellProber {
    async fn probe(&self, device: &TrackedDevice) -> bool {
        let stages = &self.config.stages;
        for (index, stage) in stages.iter().enumerate() {
            for attempt in 1..=stage.attempts {
                debug!(
                    address = %device.address,
                    stage = index + 1,
                    attempt,
                    timeout = ?stage.timeout(),
                    "active probe attempt"
                );
                if self.attempt(device, stage.timeout()).await {
                    return true;
                }
                if attempt < stage.attempts {
                    tokio::time::sleep(stage.pause()).await;
                }
            }
            if index + 1 < stages.len() {
                tokio::time::sleep(stage.pause()).await;
            }
        }
        debug!(address = %device.address, "active probe exhausted all stages");
        false
    }
}

/// Run one existence-check command with `address` appended, bounded by
/// `timeout`. `kill_on_drop` guarantees the child is reaped when the timeout
/// cancels the wait.
async fn run_bounded(
    command: &[String],
    address: &str,
    timeout: Duration,
) -> Option<std::process::Output> {
    let (program, args) = command.split_first()?;
    let child = match Command::new(program)
        .args(args)
        .arg(address)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            debug!(command = %program, error = %err, "existence check failed to spawn");
            return None;
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(err)) => {
            debug!(command = %program, error = %err, "existence check failed");
            None
        }
        Err(_) => {
            // the cancelled wait dropped the Child; kill_on_drop reaps it
            debug!(command = %program, timeout = ?timeout, "existence check timed out");
            None
        }
    }
}

fn marker_match(stdout: &[u8], markers: &[String]) -> bool {
    let text = String::from_utf8_lossy(stdout);
    if markers.is_empty() {
        return !text.trim().is_empty();
    }
    markers.iter().any(|marker| text.contains(marker.as_str()))
}
