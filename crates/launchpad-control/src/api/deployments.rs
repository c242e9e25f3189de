//! Deployment status, teardown and console endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ControlError;
use crate::types::StatusRecord;

use super::{error_response, with_status, ApiError, AppState};

/// Response for a completed teardown.
#[derive(Debug, Serialize)]
pub struct DestroyResponse {
    /// Always `success`.
    pub status: &'static str,
    /// Human-readable summary.
    pub message: String,
    /// Destroy script standard output.
    pub stdout: String,
    /// Destroy script standard error.
    pub stderr: String,
}

/// Request for a console URL.
#[derive(Debug, Default, Deserialize)]
pub struct ConsoleUrlRequest {
    /// Instance to look up.
    #[serde(default)]
    pub instance_name: String,
}

/// Response carrying a console URL.
#[derive(Debug, Serialize)]
pub struct ConsoleUrlResponse {
    /// Human-readable summary.
    pub message: String,
    /// The console URL.
    pub output: String,
    /// Lookup script standard output.
    pub stdout: String,
    /// Lookup script standard error.
    pub stderr: String,
}

/// The latest deployment record, verbatim.
pub async fn deployment_status(
    State(state): State<AppState>,
) -> Result<Json<StatusRecord>, ApiError> {
    state
        .orchestrator
        .status()
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Run the destroy script and wait for it.
pub async fn destroy_scenario(
    State(state): State<AppState>,
) -> Result<Json<DestroyResponse>, ApiError> {
    info!("destroying scenario via API");

    match state.orchestrator.destroy().await {
        Ok(output) => Ok(Json(DestroyResponse {
            status: "success",
            message: "scenario destroyed successfully".to_owned(),
            stdout: output.stdout,
            stderr: output.stderr,
        })),
        Err(e @ ControlError::ScriptNotFound(_)) => Err(with_status(StatusCode::NOT_FOUND, &e)),
        Err(e) => Err(error_response(&e)),
    }
}

/// Resolve the console URL of an instance.
pub async fn console_url(
    State(state): State<AppState>,
    body: Result<Json<ConsoleUrlRequest>, JsonRejection>,
) -> Result<Json<ConsoleUrlResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        error_response(&ControlError::invalid_argument(format!(
            "invalid console request: {rejection}"
        )))
    })?;

    let console = state
        .orchestrator
        .console_url(&request.instance_name)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ConsoleUrlResponse {
        message: format!("console requested for {}", request.instance_name.trim()),
        output: console.url,
        stdout: console.stdout,
        stderr: console.stderr,
    }))
}
