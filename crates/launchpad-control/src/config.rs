//! Configuration for launchpad-control.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the launchpad service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LaunchpadConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// On-disk layout for scenarios and deployment state.
    #[serde(default)]
    pub storage: StorageConfig,

    /// External provisioning, teardown and console scripts.
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Cloud credential bootstrap.
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Background monitor behaviour.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Log file sink.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LaunchpadConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `launchpad.toml` in the current directory (if present)
    /// 3. The file at `path` (if provided)
    /// 4. Environment variables with `LAUNCHPAD_` prefix
    pub fn load(path: Option<&Path>) -> ControlResult<Self> {
        let mut figment = Figment::new().merge(Toml::file("launchpad.toml"));

        if let Some(p) = path {
            figment = figment.merge(Toml::file(p));
        }

        figment
            .merge(Env::prefixed("LAUNCHPAD_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Directory the log file sink writes into.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.storage.resolve(&self.logging.directory)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Directory served for non-API paths.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Allow cross-origin requests from any origin.
    #[serde(default = "default_true")]
    pub permissive_cors: bool,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5001)
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

const fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            static_dir: default_static_dir(),
            permissive_cors: default_true(),
        }
    }
}

/// On-disk layout.
///
/// Every relative path is interpreted against `base_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all relative paths.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Directory holding `scenario_<name>.json` documents.
    #[serde(default = "default_scenario_dir")]
    pub scenario_dir: PathBuf,

    /// Directory handed to the provisioning script for generated output.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// The single deployment status record.
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    /// Marker file holding the pid of the last launched deployment.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Scenario served when nothing else has been stored.
    #[serde(default = "default_scenario_file")]
    pub default_scenario_file: PathBuf,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_scenario_dir() -> PathBuf {
    PathBuf::from("scenario")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tf_out")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("scenario/deployment_status.json")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("last_deployment.pid")
}

fn default_scenario_file() -> PathBuf {
    PathBuf::from("scenario/scenario_file.json")
}

impl StorageConfig {
    /// Storage rooted at `base_dir` with every other path at its default.
    #[must_use]
    pub fn rooted_at(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve `path` against the base directory unless it is absolute.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Absolute-or-base-relative scenario directory.
    #[must_use]
    pub fn scenario_dir(&self) -> PathBuf {
        self.resolve(&self.scenario_dir)
    }

    /// Output directory passed to the provisioning script.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    /// Status record path.
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.resolve(&self.status_file)
    }

    /// Last-deployment pid marker path.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.resolve(&self.pid_file)
    }

    /// Default scenario path.
    #[must_use]
    pub fn default_scenario_file(&self) -> PathBuf {
        self.resolve(&self.default_scenario_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            scenario_dir: default_scenario_dir(),
            output_dir: default_output_dir(),
            status_file: default_status_file(),
            pid_file: default_pid_file(),
            default_scenario_file: default_scenario_file(),
        }
    }
}

/// How to invoke one external script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptConfig {
    /// Script location.
    pub path: PathBuf,

    /// Interpreter to run the script through (e.g. `bash`). Executed directly when unset.
    #[serde(default)]
    pub interpreter: Option<String>,
}

impl ScriptConfig {
    /// Script executed directly.
    #[must_use]
    pub fn direct(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interpreter: None,
        }
    }

    /// Script run through `interpreter`.
    #[must_use]
    pub fn interpreted(path: impl Into<PathBuf>, interpreter: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interpreter: Some(interpreter.into()),
        }
    }
}

/// External scripts invoked by the core.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    /// Provisioning script: `<script> <scenario-file> <output-dir>`.
    #[serde(default = "default_provision_script")]
    pub provision: ScriptConfig,

    /// Teardown script, invoked without arguments.
    #[serde(default = "default_destroy_script")]
    pub destroy: ScriptConfig,

    /// Console lookup script: `<script> <instance-name>`.
    #[serde(default = "default_console_script")]
    pub console: ScriptConfig,
}

fn default_provision_script() -> ScriptConfig {
    ScriptConfig::interpreted("scenario/generate_terraform.sh", "bash")
}

fn default_destroy_script() -> ScriptConfig {
    ScriptConfig::interpreted("scenario/destroy_scenario.sh", "bash")
}

fn default_console_script() -> ScriptConfig {
    ScriptConfig::direct("scenario/get_console_url.sh")
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            provision: default_provision_script(),
            destroy: default_destroy_script(),
            console: default_console_script(),
        }
    }
}

/// Credential bootstrap configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Script that generates the openrc file. Skipped when absent.
    #[serde(default = "default_generator_script")]
    pub generator_script: PathBuf,

    /// openrc-style file of `export KEY=VALUE` lines.
    #[serde(default = "default_openrc_path")]
    pub openrc_path: PathBuf,
}

fn default_generator_script() -> PathBuf {
    PathBuf::from("generate_app_cred_openrc_from_clouds.sh")
}

fn default_openrc_path() -> PathBuf {
    PathBuf::from("admin-openrc.sh")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            generator_script: default_generator_script(),
            openrc_path: default_openrc_path(),
        }
    }
}

/// Background monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// How long shutdown waits for in-flight monitors, in seconds.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Reconcile a stale `running` record at startup.
    #[serde(default = "default_true")]
    pub reconcile_on_startup: bool,
}

const fn default_drain_timeout_secs() -> u64 {
    10
}

impl SupervisorConfig {
    /// Shutdown drain timeout.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
            reconcile_on_startup: default_true(),
        }
    }
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// A new file every hour.
    Hourly,
    /// A new file every day.
    Daily,
    /// A single file that is never rolled.
    Never,
}

/// Log file sink written next to the console output.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to a file as well as to stdout.
    #[serde(default = "default_true")]
    pub file_enabled: bool,

    /// Directory for log files, relative to the storage base directory.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Log file name; rolled files get a date suffix.
    #[serde(default = "default_log_file_name")]
    pub file_name: String,

    /// Rollover interval.
    #[serde(default = "default_log_rotation")]
    pub rotation: LogRotation,

    /// Rolled files kept on disk, the active one included.
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_name() -> String {
    "app.log".to_owned()
}

const fn default_log_rotation() -> LogRotation {
    LogRotation::Daily
}

const fn default_max_log_files() -> usize {
    4
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_enabled: default_true(),
            directory: default_log_directory(),
            file_name: default_log_file_name(),
            rotation: default_log_rotation(),
            max_files: default_max_log_files(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LaunchpadConfig::default();
        assert_eq!(config.server.listen_addr.port(), 5001);
        assert_eq!(
            config.storage.status_file(),
            PathBuf::from("./scenario/deployment_status.json")
        );
        assert_eq!(config.scripts.provision.interpreter.as_deref(), Some("bash"));
        assert!(config.scripts.console.interpreter.is_none());
        assert!(config.supervisor.reconcile_on_startup);
        assert!(config.logging.file_enabled);
        assert_eq!(config.logging.file_name, "app.log");
        assert_eq!(config.logging.rotation, LogRotation::Daily);
        assert_eq!(config.log_dir(), PathBuf::from("./logs"));
    }

    #[test]
    fn logging_from_toml() {
        let toml = r#"
            [storage]
            base_dir = "/srv/launchpad"

            [logging]
            directory = "/var/log/launchpad"
            rotation = "hourly"
            max_files = 2
        "#;

        let config: LaunchpadConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.log_dir(), PathBuf::from("/var/log/launchpad"));
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
        assert_eq!(config.logging.max_files, 2);
        assert_eq!(config.logging.file_name, "app.log");

        let disabled: LaunchpadConfig =
            toml::from_str("[logging]\nfile_enabled = false").unwrap();
        assert!(!disabled.logging.file_enabled);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            [server]
            listen_addr = "0.0.0.0:9000"
            permissive_cors = false

            [storage]
            base_dir = "/srv/launchpad"
            output_dir = "/var/tmp/tf"

            [scripts.console]
            path = "bin/console.sh"
            interpreter = "sh"
        "#;

        let config: LaunchpadConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert!(!config.server.permissive_cors);
        assert_eq!(
            config.storage.scenario_dir(),
            PathBuf::from("/srv/launchpad/scenario")
        );
        assert_eq!(config.storage.output_dir(), PathBuf::from("/var/tmp/tf"));
        assert_eq!(
            config.scripts.console,
            ScriptConfig::interpreted("bin/console.sh", "sh")
        );
        assert_eq!(
            config.scripts.destroy.path,
            PathBuf::from("scenario/destroy_scenario.sh")
        );
    }
}
