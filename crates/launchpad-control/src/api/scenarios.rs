//! Scenario submission and retrieval endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::error::ControlError;
use crate::types::{JobId, Scenario};

use super::{error_response, ApiError, AppState};

/// Response for an accepted scenario.
#[derive(Debug, Serialize)]
pub struct CreateScenarioResponse {
    /// Always `running`.
    pub status: &'static str,
    /// Human-readable summary.
    pub message: String,
    /// Process id of the provisioning script.
    pub pid: u32,
    /// Identifier of this launch.
    pub job_id: JobId,
    /// Where the scenario document was written.
    pub file: String,
    /// Output directory handed to the provisioning script.
    pub output_dir: String,
}

/// Store a scenario and start deploying it.
///
/// Responds as soon as the provisioning process has a pid; poll
/// `/api/deployment_status` for the outcome.
pub async fn create_scenario(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateScenarioResponse>), ApiError> {
    let Json(value) = body.map_err(|rejection| {
        error_response(&ControlError::invalid_argument(format!(
            "no valid JSON received: {rejection}"
        )))
    })?;
    let scenario = Scenario::from_value(value).map_err(|e| error_response(&e))?;

    // The launch runs on its own task so a dropped request cannot abandon it half way.
    let orchestrator = Arc::clone(&state.orchestrator);
    let submission = tokio::spawn(async move { orchestrator.submit(scenario).await })
        .await
        .map_err(|e| error_response(&ControlError::internal(format!("launch task failed: {e}"))))?
        .map_err(|e| {
            error!(error = %e, "scenario submission failed");
            error_response(&e)
        })?;

    info!(
        scenario = %submission.scenario,
        job_id = %submission.receipt.job_id,
        pid = submission.receipt.pid,
        "deployment accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateScenarioResponse {
            status: "running",
            message: format!(
                "deployment of '{}' started in the background",
                submission.scenario
            ),
            pid: submission.receipt.pid,
            job_id: submission.receipt.job_id.clone(),
            file: submission.file().display().to_string(),
            output_dir: submission.receipt.output_dir.display().to_string(),
        }),
    ))
}

/// Fetch a stored scenario by name.
pub async fn get_scenario(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Scenario>, ApiError> {
    state
        .orchestrator
        .scenario(&name)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// The scenario shown to a client with nothing loaded yet.
pub async fn default_scenario(State(state): State<AppState>) -> Json<Scenario> {
    Json(state.orchestrator.default_scenario().clone())
}
