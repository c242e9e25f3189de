//! Startup reconciliation of a stale `running` record.
//!
//! If the host stopped while a deployment was in flight, nothing is left to
//! write the terminal record. On the next start the recorded pid is probed and
//! the record is closed out when the process is gone.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};
use crate::status::StatusStore;
use crate::types::{DeploymentStatus, StatusRecord};

/// What [`reconcile`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No record has ever been written.
    NoRecord,
    /// The latest deployment already finished.
    Settled(DeploymentStatus),
    /// The recorded process is still alive and left alone.
    StillRunning(u32),
    /// The record was finalised to `error`.
    Finalised(StatusRecord),
}

/// Whether a process with `pid` exists.
///
/// `EPERM` means the process exists but belongs to someone else.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Close out a `running` record whose process is no longer alive.
///
/// A corrupt record is reported, not repaired.
pub async fn reconcile(status: &StatusStore) -> ControlResult<Reconciliation> {
    let record = match status.read().await {
        Ok(record) => record,
        Err(ControlError::StatusNotFound) => return Ok(Reconciliation::NoRecord),
        Err(e) => return Err(e),
    };

    if record.status.is_terminal() {
        return Ok(Reconciliation::Settled(record.status));
    }

    let message = match record.pid {
        Some(pid) if process_alive(pid) => {
            warn!(
                pid,
                job_id = ?record.job_id,
                "deployment from a previous run is still alive, its result will not be recorded"
            );
            return Ok(Reconciliation::StillRunning(pid));
        }
        Some(pid) => format!("provisioning process {pid} exited while unsupervised"),
        None => "provisioning process was never started".to_owned(),
    };

    info!(pid = ?record.pid, job_id = ?record.job_id, %message, "reconciling stale deployment");
    let finalised = record.fail(message);
    status.write(&finalised).await?;
    Ok(Reconciliation::Finalised(finalised))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{JobId, ProcessOutcome};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StatusStore {
        StatusStore::new(
            dir.path().join("deployment_status.json"),
            dir.path().join("last_deployment.pid"),
        )
    }

    /// Pid of a process that has already been reaped.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn own_process_is_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
        assert!(!process_alive(dead_pid()));
    }

    #[tokio::test]
    async fn no_record() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            reconcile(&store(&tmp)).await.unwrap(),
            Reconciliation::NoRecord
        );
    }

    #[tokio::test]
    async fn finished_record_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let done = StatusRecord::running(JobId::new("j"), "Lab")
            .with_pid(1)
            .finish(ProcessOutcome {
                exit_code: Some(0),
                ..ProcessOutcome::default()
            });
        store.write(&done).await.unwrap();

        assert_eq!(
            reconcile(&store).await.unwrap(),
            Reconciliation::Settled(DeploymentStatus::Success)
        );
        assert_eq!(store.read().await.unwrap(), done);
    }

    #[tokio::test]
    async fn dead_pid_is_finalised() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let pid = dead_pid();
        store
            .write(&StatusRecord::running(JobId::new("j"), "Lab").with_pid(pid))
            .await
            .unwrap();

        let result = reconcile(&store).await.unwrap();
        assert!(matches!(result, Reconciliation::Finalised(_)));

        let record = store.read().await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
        assert!(record.message.contains("exited while unsupervised"));
        assert_eq!(record.pid, Some(pid));
    }

    #[tokio::test]
    async fn live_pid_stays_running() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let pid = std::process::id();
        store
            .write(&StatusRecord::running(JobId::new("j"), "Lab").with_pid(pid))
            .await
            .unwrap();

        assert_eq!(
            reconcile(&store).await.unwrap(),
            Reconciliation::StillRunning(pid)
        );
        assert_eq!(
            store.read().await.unwrap().status,
            DeploymentStatus::Running
        );
    }

    #[tokio::test]
    async fn record_without_pid_is_finalised() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store
            .write(&StatusRecord::running(JobId::new("j"), "Lab"))
            .await
            .unwrap();

        reconcile(&store).await.unwrap();
        let record = store.read().await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
        assert!(record.message.contains("never started"));
    }
}
