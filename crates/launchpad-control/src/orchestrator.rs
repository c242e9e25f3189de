//! The deployment orchestrator.
//!
//! Owns one of each component and exposes the operations the HTTP layer calls.
//! Submission claims the operation gate before the scenario file is written,
//! so a rejected submission never overwrites a scenario a running deployment
//! is reading.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{LaunchpadConfig, ScriptConfig};
use crate::console::{ConsoleUrl, ConsoleUrlResolver};
use crate::credentials::CommandEnv;
use crate::error::ControlResult;
use crate::recovery::{self, Reconciliation};
use crate::scenario::ScenarioStore;
use crate::script::ExternalScript;
use crate::status::StatusStore;
use crate::supervisor::{LaunchReceipt, OperationGate, ProcessSupervisor};
use crate::teardown::TeardownController;
use crate::types::{CommandOutput, Scenario, StatusRecord};

/// An accepted scenario submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Scenario name as submitted.
    pub scenario: String,
    /// The running launch.
    pub receipt: LaunchReceipt,
}

impl Submission {
    /// Where the scenario document was written.
    #[must_use]
    pub fn file(&self) -> &PathBuf {
        &self.receipt.scenario_path
    }
}

/// Scenario storage, deployment supervision, teardown and console lookup.
#[derive(Debug)]
pub struct Orchestrator {
    scenarios: ScenarioStore,
    status: StatusStore,
    supervisor: ProcessSupervisor,
    teardown: TeardownController,
    console: ConsoleUrlResolver,
}

impl Orchestrator {
    /// Assemble from already-built components.
    #[must_use]
    pub const fn new(
        scenarios: ScenarioStore,
        status: StatusStore,
        supervisor: ProcessSupervisor,
        teardown: TeardownController,
        console: ConsoleUrlResolver,
    ) -> Self {
        Self {
            scenarios,
            status,
            supervisor,
            teardown,
            console,
        }
    }

    /// Build every component from configuration.
    ///
    /// Every script runs from the storage base directory with `env` applied.
    #[must_use]
    pub fn from_config(config: &LaunchpadConfig, env: CommandEnv, default_scenario: Scenario) -> Self {
        let storage = &config.storage;
        let env = Arc::new(env);
        let script = |script: &ScriptConfig| {
            ExternalScript::from_config(script, |path| storage.resolve(path))
                .with_working_dir(&storage.base_dir)
                .with_env(Arc::clone(&env))
        };

        let status = StatusStore::new(storage.status_file(), storage.pid_file());
        let gate = OperationGate::new();

        let supervisor = ProcessSupervisor::new(
            script(&config.scripts.provision),
            status.clone(),
            storage.output_dir(),
            gate.clone(),
        );
        let teardown = TeardownController::new(script(&config.scripts.destroy), gate);
        let console = ConsoleUrlResolver::new(script(&config.scripts.console));

        Self::new(
            ScenarioStore::new(storage.scenario_dir(), default_scenario),
            status,
            supervisor,
            teardown,
            console,
        )
    }

    /// Store `scenario` and start deploying it.
    pub async fn submit(&self, scenario: Scenario) -> ControlResult<Submission> {
        let name = scenario.name().to_owned();
        let reservation = self.supervisor.reserve().await?;
        info!(
            scenario = %name,
            job_id = %reservation.job_id(),
            description = scenario.description().unwrap_or_default(),
            "scenario submitted"
        );

        let path = self.scenarios.save(&name, &scenario).await?;
        let receipt = self.supervisor.launch(reservation, &name, &path).await?;

        Ok(Submission {
            scenario: name,
            receipt,
        })
    }

    /// The latest deployment record.
    pub async fn status(&self) -> ControlResult<StatusRecord> {
        self.status.read().await
    }

    /// Run the destroy script.
    pub async fn destroy(&self) -> ControlResult<CommandOutput> {
        self.teardown.destroy().await
    }

    /// Look up the console address of an instance.
    pub async fn console_url(&self, instance: &str) -> ControlResult<ConsoleUrl> {
        self.console.resolve(instance).await
    }

    /// A stored scenario.
    pub async fn scenario(&self, name: &str) -> ControlResult<Scenario> {
        self.scenarios.load(name).await
    }

    /// The fallback scenario served to new clients.
    #[must_use]
    pub const fn default_scenario(&self) -> &Scenario {
        self.scenarios.default_scenario()
    }

    /// Close out a deployment left `running` by a previous run.
    pub async fn reconcile(&self) -> ControlResult<Reconciliation> {
        recovery::reconcile(&self.status).await
    }

    /// Number of deployments still being monitored.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.supervisor.in_flight()
    }

    /// Drain monitors, detaching any still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        self.supervisor.shutdown(timeout).await;
    }
}
