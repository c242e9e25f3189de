//! HTTP API for launchpad.
//!
//! Provides endpoints for:
//! - Scenario submission and retrieval
//! - Deployment status polling
//! - Teardown and console lookup
//! - Health checks

mod deployments;
mod scenarios;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::ControlError;
use crate::orchestrator::Orchestrator;

pub use deployments::{ConsoleUrlRequest, ConsoleUrlResponse, DestroyResponse};
pub use scenarios::CreateScenarioResponse;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator every handler delegates to.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wrap an orchestrator for the router.
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/create_scenario", post(scenarios::create_scenario))
        .route("/api/get_scenario/{name}", get(scenarios::get_scenario))
        .route("/api/default_scenario", get(scenarios::default_scenario))
        .route(
            "/api/deployment_status",
            get(deployments::deployment_status),
        )
        .route("/api/destroy_scenario", post(deployments::destroy_scenario))
        .route("/api/console_url", post(deployments::console_url))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        in_flight: state.orchestrator.in_flight(),
    })
}

/// Health response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    in_flight: usize,
}

/// Error body returned by every endpoint.
///
/// Captured script output is attached so operators can diagnose failures from
/// the response alone.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `error`, or `unknown` when no deployment has been recorded.
    pub status: &'static str,
    /// Error message.
    pub message: String,
    /// Script standard output, when a script ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Script standard error, when a script ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&ControlError> for ErrorResponse {
    fn from(error: &ControlError) -> Self {
        let (stdout, stderr) = error
            .diagnostics()
            .map(|(out, err)| (Some(out.to_owned()), Some(err.to_owned())))
            .unwrap_or_default();
        Self {
            status: if matches!(error, ControlError::StatusNotFound) {
                "unknown"
            } else {
                "error"
            },
            message: error.to_string(),
            stdout,
            stderr,
        }
    }
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map an error to a response using the default status for its kind.
pub(crate) fn error_response(error: &ControlError) -> ApiError {
    with_status(error_to_status(error), error)
}

pub(crate) fn with_status(status: StatusCode, error: &ControlError) -> ApiError {
    (status, Json(ErrorResponse::from(error)))
}

const fn error_to_status(error: &ControlError) -> StatusCode {
    match error {
        ControlError::ScenarioNotFound(_) | ControlError::StatusNotFound => StatusCode::NOT_FOUND,
        ControlError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ControlError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_support::{get, json_body, send, state};
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn health_endpoint() {
        let tmp = TempDir::new().unwrap();
        let response = send(&state(tmp.path()), get("/health")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["in_flight"], 0);
    }

    #[test]
    fn error_body_carries_streams() {
        let error = ControlError::ProcessFailure {
            message: "failed to destroy scenario".to_owned(),
            exit_code: Some(1),
            stdout: "out".to_owned(),
            stderr: "err".to_owned(),
        };
        let (status, Json(body)) = error_response(&error);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "error");
        assert_eq!(body.stdout.as_deref(), Some("out"));
        assert_eq!(body.stderr.as_deref(), Some("err"));
    }

    #[test]
    fn missing_status_is_unknown() {
        let (status, Json(body)) = error_response(&ControlError::StatusNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.status, "unknown");
        assert!(body.stdout.is_none());
    }
}
