//! Common test utilities for launchpad integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use launchpad_control::api::AppState;
use launchpad_control::config::StorageConfig;
use launchpad_control::{
    CommandEnv, JobId, LaunchpadConfig, Orchestrator, Scenario, StatusRecord, StatusStore,
};
use tempfile::TempDir;

/// An isolated storage root with the orchestrator wired up against it.
pub struct TestLaunchpad {
    pub dir: TempDir,
    pub config: LaunchpadConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub app_state: AppState,
}

impl TestLaunchpad {
    /// Creates a launchpad whose scripts have not been written yet.
    pub fn new() -> Self {
        Self::with_env(CommandEnv::new())
    }

    /// Creates a launchpad that hands `env` to every script.
    pub fn with_env(env: CommandEnv) -> Self {
        let dir = TempDir::new().unwrap();
        let config = LaunchpadConfig {
            storage: StorageConfig::rooted_at(dir.path()),
            ..LaunchpadConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::from_config(
            &config,
            env,
            Scenario::builtin_default(),
        ));
        let app_state = AppState::new(Arc::clone(&orchestrator));

        Self {
            dir,
            config,
            orchestrator,
            app_state,
        }
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the provisioning script.
    pub fn provision_script(&self, body: &str) -> PathBuf {
        self.script("scenario/generate_terraform.sh", body)
    }

    /// Writes the destroy script.
    pub fn destroy_script(&self, body: &str) -> PathBuf {
        self.script("scenario/destroy_scenario.sh", body)
    }

    /// Writes the console lookup script.
    pub fn console_script(&self, body: &str) -> PathBuf {
        self.script("scenario/get_console_url.sh", body)
    }

    /// Writes an executable `/bin/sh` script relative to the storage root.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Direct access to the persisted status record.
    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(
            self.config.storage.status_file(),
            self.config.storage.pid_file(),
        )
    }

    /// Polls until the status record leaves `running`.
    pub async fn wait_for_terminal(&self) -> StatusRecord {
        self.poll_until(|record| record.status.is_terminal()).await
    }

    /// Polls until the launch `job_id` has a terminal record.
    pub async fn wait_for_terminal_of(&self, job_id: &JobId) -> StatusRecord {
        self.poll_until(|record| {
            record.status.is_terminal() && record.job_id.as_ref() == Some(job_id)
        })
        .await
    }

    async fn poll_until(&self, done: impl Fn(&StatusRecord) -> bool) -> StatusRecord {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(record) = self.orchestrator.status().await {
                    if done(&record) {
                        return record;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap()
    }
}
