//! Core types for launchpad-control.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ControlError, ControlResult};

/// Name used when a submitted scenario carries no `scenario_name`.
pub const UNNAMED_SCENARIO: &str = "unnamed_scenario";

/// Unique identifier for one launch of the provisioning script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a job ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique job ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A user-submitted topology document.
///
/// The node/edge graph is opaque; only `scenario_name` is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario(Value);

impl Scenario {
    /// Wrap a JSON document. Only non-empty objects are accepted.
    pub fn from_value(value: Value) -> ControlResult<Self> {
        match value.as_object() {
            Some(body) if body.is_empty() => Err(ControlError::invalid_argument(
                "scenario body must not be empty",
            )),
            Some(_) => Ok(Self(value)),
            None => Err(ControlError::invalid_argument(
                "scenario body must be a JSON object",
            )),
        }
    }

    /// The scenario's display name, or [`UNNAMED_SCENARIO`].
    #[must_use]
    pub fn name(&self) -> &str {
        self.0
            .get("scenario_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNNAMED_SCENARIO)
    }

    /// The scenario description, if present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.0.get("description").and_then(Value::as_str)
    }

    /// Built-in scenario served when storage holds no default: one node, no edges.
    #[must_use]
    pub fn builtin_default() -> Self {
        Self(json!({
            "scenario_name": "Default Empty Scenario",
            "description": "Default scenario: no stored scenario file was found",
            "nodes": [
                {
                    "data": { "id": "n1", "name": "Initial Node" },
                    "position": { "x": 100, "y": 100 }
                }
            ],
            "edges": []
        }))
    }

    /// Borrow the underlying document.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Lifecycle state of the latest deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// The provisioning script has been accepted and has not exited yet.
    Running,
    /// The script exited with code 0.
    Success,
    /// The script exited non-zero, or could not be waited on.
    Error,
}

impl DeploymentStatus {
    /// Get the status as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Whether this is a final state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single durable record describing the latest deployment attempt.
///
/// Written once as `running` before spawn, once more with the pid, and once
/// at completion with captured output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Lifecycle state.
    pub status: DeploymentStatus,
    /// Human-readable summary.
    pub message: String,
    /// OS process id of the provisioning script, once spawned.
    pub pid: Option<u32>,
    /// Launch that produced this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Scenario name as submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Captured standard output, present after completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error, present after completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Exit code, present after completion unless killed by a signal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// When the launch was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the terminal state was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    /// Placeholder written the instant a launch is accepted, before spawn.
    #[must_use]
    pub fn running(job_id: JobId, scenario: impl Into<String>) -> Self {
        let scenario = scenario.into();
        Self {
            status: DeploymentStatus::Running,
            message: format!("deployment of '{scenario}' in progress"),
            pid: None,
            job_id: Some(job_id),
            scenario: Some(scenario),
            stdout: None,
            stderr: None,
            exit_code: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// Same record with the spawned process id filled in.
    #[must_use]
    pub fn with_pid(self, pid: u32) -> Self {
        Self {
            pid: Some(pid),
            ..self
        }
    }

    /// Terminal record built from this one.
    #[must_use]
    pub fn finish(self, outcome: ProcessOutcome) -> Self {
        let scenario = self.scenario.clone().unwrap_or_default();
        let (status, message) = if outcome.success() {
            (
                DeploymentStatus::Success,
                format!("deployment of '{scenario}' completed successfully"),
            )
        } else {
            (
                DeploymentStatus::Error,
                outcome
                    .failure
                    .clone()
                    .unwrap_or_else(|| format!("deployment of '{scenario}' failed")),
            )
        };
        Self {
            status,
            message,
            stdout: Some(outcome.stdout),
            stderr: Some(outcome.stderr),
            exit_code: outcome.exit_code,
            finished_at: Some(Utc::now()),
            ..self
        }
    }

    /// Terminal `error` record with a message and no captured output.
    #[must_use]
    pub fn fail(self, message: impl Into<String>) -> Self {
        Self {
            status: DeploymentStatus::Error,
            message: message.into(),
            stdout: Some(self.stdout.unwrap_or_default()),
            stderr: Some(self.stderr.unwrap_or_default()),
            finished_at: Some(Utc::now()),
            ..self
        }
    }
}

/// What an external process left behind when it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Set when the process could not be waited on.
    pub failure: Option<String>,
}

impl ProcessOutcome {
    /// Exit code zero is the only success signal.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none() && self.exit_code == Some(0)
    }

    /// Outcome for a wait that failed before the process reported an exit.
    #[must_use]
    pub fn wait_failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Output of a synchronous script call, streams trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}
