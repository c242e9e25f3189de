//! Cloud credential bootstrap.
//!
//! An optional generator script writes an openrc file of `export KEY=VALUE`
//! lines. The exported variables are collected into a [`CommandEnv`] that is
//! passed to every external script, leaving the host process environment
//! untouched.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{error, info, warn};

use crate::script::ExternalScript;

/// Environment variables applied to every external script.
pub type CommandEnv = BTreeMap<String, String>;

/// Parse `export KEY=VALUE` lines. Other lines are ignored.
///
/// A value wrapped in matching single or double quotes is unwrapped.
#[must_use]
pub fn parse_openrc(text: &str) -> CommandEnv {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("export "))
        .filter_map(|assignment| assignment.split_once('='))
        .filter_map(|(key, value)| {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_owned(), unquote(value.trim()).to_owned()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Run the generator script once if present. Failures are logged, never fatal.
pub async fn run_generator(script: &Path, working_dir: &Path) {
    if !script.exists() {
        warn!(script = %script.display(), "credential generator not found, skipping");
        return;
    }

    info!(script = %script.display(), "running credential generator");
    let generator = ExternalScript::new(script)
        .with_interpreter("bash")
        .with_working_dir(working_dir);

    match generator.run::<_, &str>([]).await {
        Ok((status, output)) => {
            if !output.stdout.is_empty() {
                info!(stdout = %output.stdout, "credential generator output");
            }
            if !output.stderr.is_empty() {
                warn!(stderr = %output.stderr, "credential generator reported errors");
            }
            if status.success() {
                info!("credential generator finished");
            } else {
                warn!(exit_code = ?status.code(), "credential generator failed");
            }
        }
        Err(e) => {
            error!(script = %script.display(), error = %e, "credential generator could not run");
        }
    }
}

/// Load exported variables from an openrc file. A missing file yields an empty map.
pub async fn load_openrc(path: &Path) -> CommandEnv {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let env = parse_openrc(&text);
            info!(
                path = %path.display(),
                variables = env.len(),
                "loaded cloud credentials"
            );
            env
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                path = %path.display(),
                "credentials file not found, external commands may fail"
            );
            CommandEnv::new()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read credentials file");
            CommandEnv::new()
        }
    }
}

/// Run the generator (if present) and then load the openrc file.
pub async fn bootstrap(generator: &Path, openrc: &Path, working_dir: &Path) -> CommandEnv {
    run_generator(generator, working_dir).await;
    load_openrc(openrc).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::script::test_support::write_script;
    use tempfile::TempDir;

    #[test]
    fn parses_exports_only() {
        let text = r#"
            #!/usr/bin/env bash
            # generated
            export OS_AUTH_URL=https://keystone.example:5000/v3
            export OS_PROJECT_NAME="admin project"
            export OS_PASSWORD='p=ss'
            unset OS_TOKEN
            OS_IGNORED=1
            export =nokey
        "#;

        let env = parse_openrc(text);
        assert_eq!(env.len(), 3);
        assert_eq!(env["OS_AUTH_URL"], "https://keystone.example:5000/v3");
        assert_eq!(env["OS_PROJECT_NAME"], "admin project");
        assert_eq!(env["OS_PASSWORD"], "p=ss");
    }

    #[test]
    fn mismatched_quotes_are_kept() {
        let env = parse_openrc("export A=\"half\nexport B='x\"");
        assert_eq!(env["A"], "\"half");
        assert_eq!(env["B"], "'x\"");
    }

    #[tokio::test]
    async fn missing_openrc_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(load_openrc(&tmp.path().join("admin-openrc.sh")).await.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_runs_generator_then_loads() {
        let tmp = TempDir::new().unwrap();
        let generator = write_script(
            tmp.path(),
            "gen.sh",
            "echo 'export OS_REGION_NAME=RegionOne' > admin-openrc.sh",
        );

        let env = bootstrap(&generator, &tmp.path().join("admin-openrc.sh"), tmp.path()).await;
        assert_eq!(env.get("OS_REGION_NAME").map(String::as_str), Some("RegionOne"));
    }
}
