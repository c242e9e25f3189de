//! Service lifecycle management.
//!
//! Bootstraps credentials, assembles the orchestrator and HTTP router, serves
//! until a shutdown signal, then drains in-flight deployment monitors.

use std::sync::Arc;

use axum::Router;
use launchpad_control::api::{self, AppState};
use launchpad_control::config::ServerConfig;
use launchpad_control::recovery::Reconciliation;
use launchpad_control::{credentials, LaunchpadConfig, Orchestrator, ScenarioStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// The launchpad HTTP service.
pub struct LaunchpadService {
    config: LaunchpadConfig,
    cancel: CancellationToken,
}

impl LaunchpadService {
    /// Create a new service with the given configuration.
    #[must_use]
    pub fn new(config: LaunchpadConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run the service.
    ///
    /// This will:
    /// 1. Run the credential generator and load the openrc file
    /// 2. Load the default scenario
    /// 3. Reconcile a deployment left running by a previous process
    /// 4. Serve the API and static assets until shutdown
    /// 5. Drain deployment monitors
    pub async fn run(&self) -> anyhow::Result<()> {
        let orchestrator = self.prepare().await;

        let app = build_router(&self.config.server, AppState::new(Arc::clone(&orchestrator)));
        let addr = self.config.server.listen_addr;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            static_dir = %self.config.server.static_dir.display(),
            "launchpad listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.cancel.clone()))
            .await?;

        orchestrator
            .shutdown(self.config.supervisor.drain_timeout())
            .await;

        info!("launchpad shutdown complete");
        Ok(())
    }

    /// Build the orchestrator and bring persisted state up to date.
    pub async fn prepare(&self) -> Arc<Orchestrator> {
        let storage = &self.config.storage;
        let creds = &self.config.credentials;

        let env = credentials::bootstrap(
            &storage.resolve(&creds.generator_script),
            &storage.resolve(&creds.openrc_path),
            &storage.base_dir,
        )
        .await;

        let default_scenario =
            ScenarioStore::load_default(&storage.default_scenario_file()).await;
        let orchestrator = Arc::new(Orchestrator::from_config(
            &self.config,
            env,
            default_scenario,
        ));
        info!(base_dir = %storage.base_dir.display(), "orchestrator initialised");

        if self.config.supervisor.reconcile_on_startup {
            match orchestrator.reconcile().await {
                Ok(Reconciliation::Finalised(record)) => {
                    warn!(message = %record.message, "stale deployment marked as failed");
                }
                Ok(Reconciliation::StillRunning(pid)) => {
                    warn!(pid, "previous deployment still running unsupervised");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to reconcile deployment status"),
            }
        }

        orchestrator
    }
}

/// API routes with static assets as the fallback.
pub fn build_router(server: &ServerConfig, state: AppState) -> Router {
    let app = api::router(state)
        .fallback_service(ServeDir::new(&server.static_dir))
        .layer(TraceLayer::new_for_http());

    if server.permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use launchpad_control::config::StorageConfig;
    use launchpad_control::{DeploymentStatus, JobId, StatusRecord, StatusStore};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn config(tmp: &TempDir) -> LaunchpadConfig {
        LaunchpadConfig {
            server: ServerConfig {
                static_dir: tmp.path().join("static"),
                ..ServerConfig::default()
            },
            storage: StorageConfig::rooted_at(tmp.path()),
            ..LaunchpadConfig::default()
        }
    }

    #[test]
    fn service_shutdown() {
        let tmp = TempDir::new().unwrap();
        let service = LaunchpadService::new(config(&tmp));
        assert!(!service.cancel_token().is_cancelled());
        service.shutdown();
        assert!(service.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn serves_index_and_api() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("static")).unwrap();
        std::fs::write(tmp.path().join("static/index.html"), "<h1>launchpad</h1>").unwrap();
        let service = LaunchpadService::new(config(&tmp));
        let orchestrator = service.prepare().await;
        let app = build_router(&service.config.server, AppState::new(orchestrator));

        let index = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(index.status(), StatusCode::OK);

        let health = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://editor.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert!(health
            .headers()
            .contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn prepare_reconciles_stale_record() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let status = StatusStore::new(cfg.storage.status_file(), cfg.storage.pid_file());
        status
            .write(&StatusRecord::running(JobId::new("old"), "Lab"))
            .await
            .unwrap();

        let orchestrator = LaunchpadService::new(cfg).prepare().await;
        let record = orchestrator.status().await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Error);
    }
}
