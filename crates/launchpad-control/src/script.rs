//! External script invocation.
//!
//! The core never interprets what a script does. It locates the file, makes
//! sure it can be executed, runs it with positional arguments and reads back
//! the exit code plus captured output.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ScriptConfig;
use crate::credentials::CommandEnv;
use crate::error::{ControlError, ControlResult};
use crate::types::CommandOutput;

/// Mode applied when a script is found without execute permission.
const EXECUTABLE_MODE: u32 = 0o755;

/// A script the core can run.
#[derive(Debug, Clone)]
pub struct ExternalScript {
    path: PathBuf,
    interpreter: Option<String>,
    working_dir: Option<PathBuf>,
    env: Arc<CommandEnv>,
}

impl ExternalScript {
    /// Script at `path`, executed directly.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interpreter: None,
            working_dir: None,
            env: Arc::default(),
        }
    }

    /// Build from configuration, resolving the script path with `resolve`.
    pub fn from_config(config: &ScriptConfig, resolve: impl Fn(&Path) -> PathBuf) -> Self {
        Self {
            path: resolve(&config.path),
            interpreter: config.interpreter.clone(),
            working_dir: None,
            env: Arc::default(),
        }
    }

    /// Run through an interpreter such as `bash`.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Run with `dir` as the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Extra environment variables handed to the process.
    #[must_use]
    pub fn with_env(mut self, env: Arc<CommandEnv>) -> Self {
        self.env = env;
        self
    }

    /// Script location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the script exists and is executable.
    ///
    /// A script lacking execute permission gets one repair attempt.
    pub async fn ensure_runnable(&self) -> ControlResult<()> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(ControlError::ScriptNotFound(self.path.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ControlError::ScriptNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = metadata.permissions();
            if perms.mode() & 0o111 == 0 {
                warn!(script = %self.path.display(), "script is not executable, repairing");
                perms.set_mode(EXECUTABLE_MODE);
                tokio::fs::set_permissions(&self.path, perms)
                    .await
                    .map_err(|e| ControlError::PermissionDenied {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
                info!(script = %self.path.display(), "execute permission granted");
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        Ok(())
    }

    /// Build the command without spawning it. Output streams are piped.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.path);
                cmd
            }
            None => Command::new(&self.path),
        };

        cmd.args(args)
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Run to completion, capturing both streams.
    ///
    /// Captured output is trimmed of surrounding whitespace. A non-zero exit
    /// is not an error here; callers decide based on the returned status.
    pub async fn run<I, S>(&self, args: I) -> ControlResult<(ExitStatus, CommandOutput)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.ensure_runnable().await?;

        debug!(script = %self.path.display(), "running script");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| ControlError::Spawn(format!("{}: {e}", self.path.display())))?;

        let captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        };

        debug!(
            script = %self.path.display(),
            exit_code = ?output.status.code(),
            "script finished"
        );

        Ok((output.status, captured))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    /// Write an executable `/bin/sh` script into `dir`.
    pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
