//! Error types for the doorman core library.
//!
//! Transient external-command failures (probe timeouts, non-zero exits,
//! discovery restarts) are deliberately *not* represented here; they are
//! recovered locally and collapse to boolean results. What remains are the
//! startup-time failures a caller can actually act on.

use std::path::PathBuf;

use thiserror::Error;

/// The unified error type for doorman operations.
#[derive(Debug, Error)]
pub enum DoormanError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("configuration validation failed: {0}")]
    ConfigInvalid(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for doorman operations.
pub type Result<T> = std::result::Result<T, DoormanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<DoormanError>();
        assert_sync::<DoormanError>();
    }

    #[test]
    fn display_messages() {
        let err = DoormanError::ConfigNotFound(PathBuf::from("/etc/doorman/config.toml"));
        assert!(err.to_string().contains("/etc/doorman/config.toml"));

        let err = DoormanError::ConfigInvalid("devices: at least one entry required".into());
        assert!(err.to_string().contains("devices"));
    }
}
