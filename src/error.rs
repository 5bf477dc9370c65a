//! Error Types
//!
//! Failures surfaced by the orchestrator. Profile discovery never fails and
//! has no error type; it falls back to the default profile set instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by a workflow launch.
///
/// Only synchronous failures are reported here. An engine that starts and
/// then exits with an error is observed through its log files.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Preparing the instance directory failed.
    #[error("{context} '{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The parameter set could not be serialized.
    #[error("failed to serialize workflow parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// No invocable engine runtime is present.
    #[error("engine runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The engine (or the bridge) could not be spawned.
    #[error("failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },
}

impl LaunchError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Errors returned by environment remediation actions.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("unknown environment action '{0}'")]
    UnknownAction(String),

    /// Fetching the engine artifact failed (network or HTTP status).
    #[error("download from {url} failed: {reason}")]
    Download { url: String, reason: String },

    /// The downloaded artifact could not be made executable.
    #[error("cannot mark '{}' executable: {source}", .path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The installed engine ran but did not exit cleanly.
    #[error("smoke test '{command}' failed with exit status {}", .status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    SmokeTest { command: String, status: Option<i32> },

    /// An external provisioning command could not be started or failed.
    #[error("command '{program}' failed: {reason}")]
    Command { program: String, reason: String },

    #[error("{context} '{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProvisioningError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures worth retrying as-is (network trouble).
    ///
    /// Smoke-test and command failures need a different remedy.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Download { .. })
    }
}

/// Errors reading or writing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write settings '{}': {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_is_network() {
        let err = ProvisioningError::Download {
            url: "https://get.nextflow.io".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.is_network());
        assert!(err.to_string().contains("get.nextflow.io"));
    }

    #[test]
    fn test_smoke_test_is_not_network() {
        let err = ProvisioningError::SmokeTest {
            command: "nextflow -version".to_string(),
            status: Some(1),
        };
        assert!(!err.is_network());
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn test_smoke_test_signal_display() {
        let err = ProvisioningError::SmokeTest {
            command: "nextflow -version".to_string(),
            status: None,
        };
        assert!(err.to_string().ends_with("signal"));
    }

    #[test]
    fn test_launch_io_display_includes_path() {
        let err = LaunchError::io(
            "failed to create work directory",
            "/data/instances/a/work",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/data/instances/a/work"));
        assert!(message.contains("denied"));
    }
}
