//! Launchpad control core
//!
//! This crate stores user-submitted infrastructure scenarios, launches an
//! external provisioning script for them without blocking the caller, and
//! keeps a single durable status record describing the latest deployment.
//! Teardown and console lookup are delegated to external scripts as well.
//!
//! # Architecture
//!
//! - **Scenario storage**: one pretty-printed JSON file per sanitised name,
//!   with an immutable fallback scenario chosen at startup
//! - **Process supervision**: the provisioning script runs detached from the
//!   request; a tracked monitor task writes its terminal record
//! - **Teardown and console lookup**: synchronous script calls whose exit
//!   code and output are reported back verbatim
//! - **API surface**: axum handlers mapping every failure to a structured
//!   error body that keeps captured script output
//!
//! # Deployment lifecycle
//!
//! ```text
//!            launch                 exit 0
//! (none) ──────────▶ running ──────────────▶ success
//!                       │
//!                       │ exit != 0, wait failure,
//!                       │ or found dead on restart
//!                       ▼
//!                     error
//! ```
//!
//! # Example
//!
//! ```ignore
//! use launchpad_control::{LaunchpadConfig, Orchestrator, Scenario};
//!
//! let config = LaunchpadConfig::load(None)?;
//! let orchestrator = Orchestrator::from_config(&config, Default::default(), Scenario::builtin_default());
//!
//! let scenario = Scenario::from_value(serde_json::json!({"scenario_name": "Lab"}))?;
//! let submission = orchestrator.submit(scenario).await?;
//! println!("provisioning pid {}", submission.receipt.pid);
//! ```

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod console;
pub mod credentials;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scenario;
pub mod script;
pub mod status;
pub mod supervisor;
pub mod teardown;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::LaunchpadConfig;
pub use console::{extract_console_url, ConsoleUrl, ConsoleUrlResolver};
pub use credentials::CommandEnv;
pub use error::{ControlError, ControlResult};
pub use orchestrator::{Orchestrator, Submission};
pub use recovery::Reconciliation;
pub use scenario::{sanitize_name, ScenarioStore};
pub use script::ExternalScript;
pub use status::StatusStore;
pub use supervisor::{LaunchReceipt, OperationGate, ProcessSupervisor};
pub use teardown::TeardownController;
pub use types::{CommandOutput, DeploymentStatus, JobId, Scenario, StatusRecord};
