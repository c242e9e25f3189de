//! Error types for launchpad-control.

use std::path::PathBuf;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while storing scenarios or driving external commands.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Scenario document does not exist in storage.
    #[error("scenario '{0}' not found")]
    ScenarioNotFound(String),

    /// No deployment has ever been launched.
    #[error("no deployment status record exists")]
    StatusNotFound,

    /// A stored scenario is not valid JSON.
    #[error("scenario file {} contains invalid JSON: {reason}", path.display())]
    InvalidFormat {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The persisted status record could not be parsed.
    #[error("deployment status record is corrupt: {0}")]
    CorruptState(String),

    /// External command is missing from its configured location.
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    /// External command exists but could not be made executable.
    #[error("cannot make {} executable: {reason}", path.display())]
    PermissionDenied {
        /// Script path.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// A synchronous external command exited unsuccessfully.
    #[error("{message} (exit code {})", exit_code.map_or_else(|| "none".to_owned(), |c| c.to_string()))]
    ProcessFailure {
        /// Human-readable summary.
        message: String,
        /// Exit code, if the process was not killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Console lookup produced no URL.
    #[error("no console URL found for instance '{instance}'")]
    ConsoleUrlNotFound {
        /// Instance that was looked up.
        instance: String,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// A required argument was missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another deployment or teardown is already in flight.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The external process could not be started.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Captured process output attached to this error, if any.
    ///
    /// Returned as `(stdout, stderr)` so callers can surface raw script output
    /// to operators.
    #[must_use]
    pub fn diagnostics(&self) -> Option<(&str, &str)> {
        match self {
            Self::ProcessFailure { stdout, stderr, .. }
            | Self::ConsoleUrlNotFound { stdout, stderr, .. } => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_failure_keeps_streams() {
        let err = ControlError::ProcessFailure {
            message: "destroy failed".to_owned(),
            exit_code: Some(2),
            stdout: "out".to_owned(),
            stderr: "err".to_owned(),
        };
        assert_eq!(err.to_string(), "destroy failed (exit code 2)");
        assert_eq!(err.diagnostics(), Some(("out", "err")));
    }

    #[test]
    fn plain_errors_have_no_diagnostics() {
        assert!(ControlError::StatusNotFound.diagnostics().is_none());
        assert!(ControlError::conflict("busy").diagnostics().is_none());
    }
}
