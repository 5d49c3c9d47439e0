//! Passive discovery scanner.
//!
//! Supervises a long-lived external discovery process (`bluetoothctl` by
//! default), feeds it setup commands over stdin, and watches its stdout for
//! lines mentioning a tracked address. A died or misbehaving process is
//! stopped gracefully and relaunched after a fixed backoff; a missing binary
//! is fatal and disables the scanner permanently rather than looping.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::store::PresenceStore;
use crate::types::{TrackedDevice, ADDRESS_EXTRACT_RE};

/// Run-state of the supervised discovery process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No process; either not started yet, waiting out the restart backoff,
    /// or permanently disabled.
    Stopped,
    /// Launching the process and sending setup commands.
    Starting,
    /// Reading discovery output.
    Running,
    /// Winding the process down.
    Stopping,
}

enum SessionEnd {
    /// The child's output stream ended or became unreadable.
    StreamEnded,
    /// Shutdown was requested while the session was running.
    Shutdown,
}

/// Supervised passive discovery listener.
///
/// Owns the external process for its lifetime and writes sightings into the
/// shared store. Consume with [`PassiveScanner::run`], typically inside
/// `tokio::spawn`.
pub struct PassiveScanner {
    store: Arc<PresenceStore>,
    targets: Vec<TrackedDevice>,
    config: ScannerConfig,
    state_tx: watch::Sender<ScanState>,
}

impl PassiveScanner {
    /// Create a scanner for the given targets.
    ///
    /// Returns the scanner and a receiver observing its run-state.
    pub fn new(
        store: Arc<PresenceStore>,
        targets: Vec<TrackedDevice>,
        config: ScannerConfig,
    ) -> (Self, watch::Receiver<ScanState>) {
        let (state_tx, state_rx) = watch::channel(ScanState::Stopped);
        (
            Self {
                store,
                targets,
                config,
                state_tx,
            },
            state_rx,
        )
    }

    /// Supervision loop: launch, read, stop, back off, relaunch — until
    /// `shutdown` flips or the discovery binary turns out to be missing.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(ScanState::Starting);
            match self.run_session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::StreamEnded) => {
                    warn!("discovery process output ended, scheduling restart");
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Fatal: the binary is not installed. Restarting would
                    // fail the same way forever.
                    error!(
                        command = %self.config.command.join(" "),
                        "discovery binary not found, scanner disabled"
                    );
                    self.set_state(ScanState::Stopped);
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "discovery session failed, scheduling restart");
                }
            }

            self.set_state(ScanState::Stopped);
            tokio::select! {
                () = tokio::time::sleep(self.config.restart_delay()) => {}
                _ = shutdown.changed() => break,
            }
        }
        self.set_state(ScanState::Stopped);
        info!("passive scanner stopped");
    }

    async fn run_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> std::io::Result<SessionEnd> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "scanner command is empty",
            ));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "child stdout unavailable")
        })?;

        if let Some(stdin) = stdin.as_mut() {
            self.send_commands(stdin, &self.config.setup_commands).await;
        }

        self.set_state(ScanState::Running);
        info!("passive scanner active");

        let mut lines = BufReader::new(stdout).lines();
        let end = loop {
            tokio::select! {
                _ = shutdown.changed() => break SessionEnd::Shutdown,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(device) = match_target(&self.targets, &line) {
                            let now = Instant::now();
                            self.store.record_sighting(&device.address, now).await;
                            debug!(
                                address = %device.address,
                                line = %line.trim(),
                                "passive sighting"
                            );
                        }
                    }
                    Ok(None) => break SessionEnd::StreamEnded,
                    Err(err) => {
                        warn!(error = %err, "error reading discovery output");
                        break SessionEnd::StreamEnded;
                    }
                },
            }
        };

        self.set_state(ScanState::Stopping);
        self.stop_process(child, stdin).await;
        Ok(end)
    }

    /// Best-effort write of control commands to the child's stdin, each
    /// bounded by the configured command timeout.
    async fn send_commands(&self, stdin: &mut ChildStdin, commands: &[String]) {
        for command in commands {
            let write = async {
                stdin.write_all(command.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            };
            match tokio::time::timeout(self.config.command_timeout(), write).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(command = %command, error = %err, "scan control command failed");
                    return;
                }
                Err(_) => {
                    debug!(command = %command, "scan control command timed out");
                    return;
                }
            }
        }
    }

    /// Stop the child: send the stop commands, wait out the grace period,
    /// then kill if it is still alive.
    async fn stop_process(&self, mut child: Child, stdin: Option<ChildStdin>) {
        if let Some(mut stdin) = stdin {
            self.send_commands(&mut stdin, &self.config.stop_commands)
                .await;
            // dropping stdin closes the pipe so an interactive child can exit
        }
        match tokio::time::timeout(self.config.stop_grace(), child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "discovery process exited"),
            Ok(Err(err)) => warn!(error = %err, "failed waiting for discovery process"),
            Err(_) => {
                warn!("discovery process ignored stop request, killing");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill discovery process");
                }
            }
        }
    }

    fn set_state(&self, state: ScanState) {
        self.state_tx.send_replace(state);
    }
}

/// Match one output line against the target set: first a case-insensitive
/// literal substring check per address, then extraction of any 6-octet
/// colon-hex pattern and a lookup of the result.
fn match_target<'a>(targets: &'a [TrackedDevice], line: &str) -> Option<&'a TrackedDevice> {
    let lower = line.to_ascii_lowercase();
    for target in targets {
        if lower.contains(&target.address.as_str().to_ascii_lowercase()) {
            return Some(target);
        }
    }
    let extracted = ADDRESS_EXTRACT_RE.find(&lower)?.as_str().to_ascii_uppercase();
    targets
        .iter()
        .find(|target| target.address.as_str() == extracted)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn target(address: &str) -> TrackedDevice {
        TrackedDevice {
            address: address.parse().unwrap(),
            label: None,
        }
    }

    #[test]
    fn matches_literal_substring_case_insensitively() {
        let targets = vec![target("0C:15:63:DF:61:2F")];
        let line = "[NEW] Device 0c:15:63:df:61:2f Tile Tracker";
        assert!(match_target(&targets, line).is_some());
    }

    #[test]
    fn matches_extracted_address_pattern() {
        let targets = vec![target("80:04:5F:A2:66:57")];
        // mixed case, embedded in controller chatter
        let line = "\t[CHG] Device 80:04:5f:A2:66:57 RSSI: -61";
        let matched = match_target(&targets, line).unwrap();
        assert_eq!(matched.address.as_str(), "80:04:5F:A2:66:57");
    }

    #[test]
    fn ignores_unknown_addresses_and_plain_chatter() {
        let targets = vec![target("0C:15:63:DF:61:2F")];
        assert!(match_target(&targets, "Discovery started").is_none());
        assert!(match_target(&targets, "[NEW] Device AA:BB:CC:DD:EE:FF Phone").is_none());
    }

    #[tokio::test]
    async fn missing_binary_disables_scanner_permanently() {
        let store = Arc::new(PresenceStore::new([target("0C:15:63:DF:61:2F")], 3));
        let config = ScannerConfig {
            command: vec!["doorman-test-no-such-binary".into()],
            ..ScannerConfig::default()
        };
        let (scanner, state_rx) =
            PassiveScanner::new(store, vec![target("0C:15:63:DF:61:2F")], config);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        // must return on its own, without a shutdown signal
        tokio::time::timeout(Duration::from_secs(5), scanner.run(shutdown_rx))
            .await
            .expect("scanner should exit when the binary is missing");
        assert_eq!(*state_rx.borrow(), ScanState::Stopped);
    }

    #[tokio::test]
    async fn records_sighting_from_process_output() {
        let store = Arc::new(PresenceStore::new([target("0C:15:63:DF:61:2F")], 3));
        let config = ScannerConfig {
            command: vec![
                "sh".into(),
                "-c".into(),
                "echo '[NEW] Device 0C:15:63:DF:61:2F Tag'".into(),
            ],
            restart_delay_secs: 60,
            ..ScannerConfig::default()
        };
        let (scanner, _state_rx) =
            PassiveScanner::new(Arc::clone(&store), vec![target("0C:15:63:DF:61:2F")], config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scanner.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.devices[0].observation.last_seen.is_some());
    }

    #[tokio::test]
    async fn waits_out_backoff_before_restarting() {
        let store = Arc::new(PresenceStore::new([target("0C:15:63:DF:61:2F")], 3));
        let config = ScannerConfig {
            command: vec!["sh".into(), "-c".into(), "true".into()],
            restart_delay_secs: 30,
            ..ScannerConfig::default()
        };
        let (scanner, state_rx) =
            PassiveScanner::new(store, vec![target("0C:15:63:DF:61:2F")], config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scanner.run(shutdown_rx));
        // the child exits immediately; by now the scanner must be parked in
        // its backoff sleep, not running a fresh session
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(*state_rx.borrow(), ScanState::Stopped);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
