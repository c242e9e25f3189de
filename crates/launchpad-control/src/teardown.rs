//! Synchronous scenario teardown.

use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::script::ExternalScript;
use crate::supervisor::{Operation, OperationGate};
use crate::types::CommandOutput;

/// Runs the destroy script and reports success from its exit code alone.
///
/// The status record is not touched; it keeps describing the last deployment
/// until the next launch replaces it.
#[derive(Debug, Clone)]
pub struct TeardownController {
    script: ExternalScript,
    gate: OperationGate,
}

impl TeardownController {
    /// Create a controller sharing `gate` with the supervisor.
    pub const fn new(script: ExternalScript, gate: OperationGate) -> Self {
        Self { script, gate }
    }

    /// Destroy the deployed scenario, blocking until the script exits.
    pub async fn destroy(&self) -> ControlResult<CommandOutput> {
        self.script.ensure_runnable().await?;
        let _permit = self.gate.acquire(Operation::Destroying).await?;

        info!(script = %self.script.path().display(), "destroying scenario");
        let (status, output) = self.script.run::<_, &str>([]).await?;

        if !output.stdout.is_empty() {
            info!(stdout = %output.stdout, "destroy script output");
        }
        if !output.stderr.is_empty() {
            warn!(stderr = %output.stderr, "destroy script stderr");
        }

        if status.success() {
            info!("scenario destroyed");
            Ok(output)
        } else {
            error!(exit_code = ?status.code(), "destroy script failed");
            Err(ControlError::ProcessFailure {
                message: "failed to destroy scenario".to_owned(),
                exit_code: status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::script::test_support::write_script;
    use crate::types::JobId;
    use tempfile::TempDir;

    fn controller(tmp: &TempDir, body: &str) -> TeardownController {
        let path = write_script(tmp.path(), "destroy_scenario.sh", body);
        TeardownController::new(ExternalScript::new(path), OperationGate::new())
    }

    #[tokio::test]
    async fn missing_script_never_spawns() {
        let tmp = TempDir::new().unwrap();
        let controller = TeardownController::new(
            ExternalScript::new(tmp.path().join("destroy_scenario.sh")),
            OperationGate::new(),
        );

        let err = controller.destroy().await.unwrap_err();
        assert!(matches!(err, ControlError::ScriptNotFound(_)));
        assert!(controller.gate.current().is_none());
    }

    #[tokio::test]
    async fn success_returns_trimmed_streams() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp, "echo '  Destroy complete!  '\necho 'warning: slow' >&2");

        let output = controller.destroy().await.unwrap();
        assert_eq!(output.stdout, "Destroy complete!");
        assert_eq!(output.stderr, "warning: slow");
    }

    #[tokio::test]
    async fn failure_keeps_streams() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp, "echo partial\necho 'state locked' >&2\nexit 2");

        let err = controller.destroy().await.unwrap_err();
        assert_eq!(err.diagnostics(), Some(("partial", "state locked")));
        assert!(matches!(
            err,
            ControlError::ProcessFailure {
                exit_code: Some(2),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn conflicts_with_running_deployment() {
        let tmp = TempDir::new().unwrap();
        let controller = controller(&tmp, "echo never");
        let _deploying = controller
            .gate
            .try_acquire(Operation::Deploying(JobId::new("j")))
            .unwrap();

        let err = controller.destroy().await.unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
    }
}
