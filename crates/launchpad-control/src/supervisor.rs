//! Provisioning process supervision.
//!
//! [`ProcessSupervisor::launch`] spawns the provisioning script and returns as
//! soon as the process has a pid. A monitor task owned by the supervisor waits
//! for the process to exit and writes the terminal status record.
//!
//! ```text
//! launch ──▶ write(running, pid=null) ──▶ spawn ──▶ write(running, pid) ──▶ return pid
//!                                                     │
//!                                                     ▼
//!                                 monitor: wait ──▶ write(success | error)
//! ```
//!
//! Only one deployment or teardown runs at a time; [`OperationGate`] rejects
//! overlapping requests with [`ControlError::Conflict`]. The terminal write and
//! the gate release happen under one transition lock, so a caller that has
//! seen the terminal record can always claim the gate again.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::script::ExternalScript;
use crate::status::StatusStore;
use crate::types::{JobId, ProcessOutcome, StatusRecord};

/// Operation currently holding the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A provisioning process is running.
    Deploying(JobId),
    /// The teardown script is running.
    Destroying,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploying(job_id) => write!(f, "deployment {job_id} is still running"),
            Self::Destroying => f.write_str("a teardown is in progress"),
        }
    }
}

/// In-process exclusion between deployments and teardowns.
#[derive(Debug, Clone, Default)]
pub struct OperationGate {
    current: Arc<Mutex<Option<Operation>>>,
    /// Held while a finishing operation writes its last record and releases.
    transition: Arc<tokio::sync::Mutex<()>>,
}

impl OperationGate {
    /// Create an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate for `operation`, waiting out a release in progress.
    ///
    /// Fails with [`ControlError::Conflict`] if another operation holds it.
    pub async fn acquire(&self, operation: Operation) -> ControlResult<GatePermit> {
        let _transition = self.transition.lock().await;
        self.try_acquire(operation)
    }

    /// Claim the gate for `operation` without waiting on a release in progress.
    pub fn try_acquire(&self, operation: Operation) -> ControlResult<GatePermit> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = current.as_ref() {
            return Err(ControlError::conflict(active.to_string()));
        }
        *current = Some(operation);
        Ok(GatePermit {
            gate: self.clone(),
        })
    }

    /// Operation holding the gate, if any.
    #[must_use]
    pub fn current(&self) -> Option<Operation> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Releases the gate when dropped.
#[derive(Debug)]
pub struct GatePermit {
    gate: OperationGate,
}

impl GatePermit {
    /// The operation this permit holds the gate for.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        self.gate.current()
    }

    /// Run `last` and release the gate before anyone can acquire it again.
    pub async fn release_after<F: Future>(self, last: F) -> F::Output {
        let transition = Arc::clone(&self.gate.transition);
        let _transition = transition.lock().await;
        let output = last.await;
        drop(self);
        output
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        *self
            .gate
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A claimed deployment slot, consumed by [`ProcessSupervisor::launch`].
#[derive(Debug)]
pub struct Reservation {
    job_id: JobId,
    permit: GatePermit,
}

impl Reservation {
    /// Identifier the launch will run under.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

/// What the caller gets back from a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReceipt {
    /// Identifier of this launch.
    pub job_id: JobId,
    /// Process id of the provisioning script.
    pub pid: u32,
    /// Scenario file handed to the script.
    pub scenario_path: PathBuf,
    /// Output directory handed to the script.
    pub output_dir: PathBuf,
}

/// A spawned provisioning process, owned by its monitor until it exits.
struct DeploymentJob {
    job_id: JobId,
    scenario: String,
    child: Child,
    record: StatusRecord,
    permit: GatePermit,
}

/// Launches the provisioning script and supervises it in the background.
pub struct ProcessSupervisor {
    script: ExternalScript,
    status: StatusStore,
    output_dir: PathBuf,
    gate: OperationGate,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl ProcessSupervisor {
    /// Create a supervisor for `script`, recording state in `status`.
    pub fn new(
        script: ExternalScript,
        status: StatusStore,
        output_dir: impl Into<PathBuf>,
        gate: OperationGate,
    ) -> Self {
        Self {
            script,
            status,
            output_dir: output_dir.into(),
            gate,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Directory handed to the provisioning script.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The gate shared with teardown.
    #[must_use]
    pub fn gate(&self) -> &OperationGate {
        &self.gate
    }

    /// Number of monitors still waiting on a process.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Claim the gate for a new deployment.
    ///
    /// Done before anything is written so a rejected launch leaves storage untouched.
    pub async fn reserve(&self) -> ControlResult<Reservation> {
        if self.tracker.is_closed() {
            return Err(ControlError::conflict("service is shutting down"));
        }
        let job_id = JobId::generate();
        let permit = self
            .gate
            .acquire(Operation::Deploying(job_id.clone()))
            .await?;
        Ok(Reservation { job_id, permit })
    }

    /// Start the provisioning script for `scenario_path` and return immediately.
    ///
    /// The `running` record is persisted before the process is spawned, so a
    /// concurrent poll always finds at least the placeholder.
    pub async fn launch(
        &self,
        reservation: Reservation,
        scenario: &str,
        scenario_path: &Path,
    ) -> ControlResult<LaunchReceipt> {
        let Reservation { job_id, permit } = reservation;

        self.script.ensure_runnable().await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let record = StatusRecord::running(job_id.clone(), scenario);
        self.status.write(&record).await?;

        let mut command = self
            .script
            .command([scenario_path.as_os_str(), self.output_dir.as_os_str()]);
        command.kill_on_drop(false);
        #[cfg(unix)]
        command.process_group(0);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start provisioning script: {e}");
                error!(job_id = %job_id, scenario = %scenario, error = %e, "spawn failed");
                let failed = record.fail(message.clone());
                if let Err(write_err) = permit.release_after(self.status.write(&failed)).await {
                    error!(error = %write_err, "failed to record spawn failure");
                }
                return Err(ControlError::Spawn(message));
            }
        };

        // A freshly spawned child always has an id until it has been reaped.
        let pid = child
            .id()
            .ok_or_else(|| ControlError::internal("spawned process has no pid"))?;

        info!(
            job_id = %job_id,
            scenario = %scenario,
            pid,
            script = %self.script.path().display(),
            "deployment started"
        );

        let record = record.with_pid(pid);
        if let Err(e) = self.status.write(&record).await {
            error!(job_id = %job_id, error = %e, "failed to record pid");
        }
        if let Err(e) = self.status.write_pid(pid).await {
            warn!(
                path = %self.status.pid_file().display(),
                error = %e,
                "failed to write pid marker"
            );
        }

        let job = DeploymentJob {
            job_id: job_id.clone(),
            scenario: scenario.to_owned(),
            child,
            record,
            permit,
        };
        self.tracker
            .spawn(monitor(job, self.status.clone(), self.cancel.clone()));

        Ok(LaunchReceipt {
            job_id,
            pid,
            scenario_path: scenario_path.to_path_buf(),
            output_dir: self.output_dir.clone(),
        })
    }

    /// Stop accepting launches and wait for in-flight monitors.
    ///
    /// Monitors still waiting after `timeout` are cancelled. Their processes
    /// keep running and their records stay `running` until reconciled.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tracker.close();
        if self.tracker.is_empty() {
            return;
        }

        info!(in_flight = self.tracker.len(), "waiting for deployment monitors");
        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tracker.len(),
                "monitors still running after drain timeout, detaching"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
    }
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("script", &self.script.path())
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Wait for the process and write the one terminal record.
async fn monitor(job: DeploymentJob, status: StatusStore, cancel: CancellationToken) {
    let DeploymentJob {
        job_id,
        scenario,
        child,
        record,
        permit,
    } = job;

    let outcome = tokio::select! {
        biased;

        () = cancel.cancelled() => {
            warn!(
                job_id = %job_id,
                pid = ?record.pid,
                "monitor detached, provisioning process left unsupervised"
            );
            return;
        }

        result = child.wait_with_output() => match result {
            Ok(output) => ProcessOutcome {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                failure: None,
            },
            Err(e) => ProcessOutcome::wait_failed(format!(
                "failed to wait on provisioning process: {e}"
            )),
        },
    };

    if outcome.success() {
        info!(job_id = %job_id, scenario = %scenario, "deployment completed successfully");
    } else {
        error!(
            job_id = %job_id,
            scenario = %scenario,
            exit_code = ?outcome.exit_code,
            stderr = %outcome.stderr,
            "deployment failed"
        );
    }

    let terminal = record.finish(outcome);
    if let Err(e) = permit.release_after(status.write(&terminal)).await {
        error!(job_id = %job_id, error = %e, "failed to write terminal status");
    }
}
