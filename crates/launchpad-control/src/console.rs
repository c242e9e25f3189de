//! Console URL lookup.
//!
//! The lookup script prints whatever it likes; the first URL found in its
//! combined output is taken as the console address. The exit code is not
//! consulted, since some lookup tools exit non-zero after printing the URL.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};
use crate::script::ExternalScript;

/// An `http` or `https` URL running up to whitespace, a quote or an angle bracket.
static CONSOLE_URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s'"<>]+"#).ok());

/// First URL in `text`, if any.
#[must_use]
pub fn extract_console_url(text: &str) -> Option<&str> {
    CONSOLE_URL_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.find(text))
        .map(|m| m.as_str())
}

/// A resolved console address with the output it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleUrl {
    /// The console URL.
    pub url: String,
    /// Lookup script standard output.
    pub stdout: String,
    /// Lookup script standard error.
    pub stderr: String,
}

/// Runs the lookup script for an instance and scrapes a URL from its output.
#[derive(Debug, Clone)]
pub struct ConsoleUrlResolver {
    script: ExternalScript,
}

impl ConsoleUrlResolver {
    /// Create a resolver around the lookup script.
    pub const fn new(script: ExternalScript) -> Self {
        Self { script }
    }

    /// Look up the console URL of `instance`.
    pub async fn resolve(&self, instance: &str) -> ControlResult<ConsoleUrl> {
        let instance = instance.trim();
        if instance.is_empty() {
            return Err(ControlError::invalid_argument("instance_name is required"));
        }

        let (status, output) = self.script.run([instance]).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);

        match extract_console_url(&combined) {
            Some(url) => {
                info!(instance = %instance, url = %url, "console url resolved");
                Ok(ConsoleUrl {
                    url: url.to_owned(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
            None => {
                warn!(
                    instance = %instance,
                    exit_code = ?status.code(),
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "no console url in lookup output"
                );
                Err(ControlError::ConsoleUrlNotFound {
                    instance: instance.to_owned(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::script::test_support::write_script;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("Preparing...\nhttps://10.0.0.5:6080/console\nDone", Some("https://10.0.0.5:6080/console"))]
    #[case("url: 'http://host/vnc_auto.html?token=abc'", Some("http://host/vnc_auto.html?token=abc"))]
    #[case("<a href=\"https://x.example/c\">", Some("https://x.example/c"))]
    #[case("first http://a/1 then http://b/2", Some("http://a/1"))]
    #[case("ftp://files.example/x", None)]
    #[case("no address here", None)]
    fn extracts_first_url(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(extract_console_url(text), expected);
    }

    fn resolver(tmp: &TempDir, body: &str) -> ConsoleUrlResolver {
        let path = write_script(tmp.path(), "get_console_url.sh", body);
        ConsoleUrlResolver::new(ExternalScript::new(path))
    }

    #[tokio::test]
    async fn resolves_url_from_stdout() {
        let tmp = TempDir::new().unwrap();
        let resolver = resolver(
            &tmp,
            "echo 'Preparing...'\necho \"https://10.0.0.5:6080/console\"\necho 'Done'",
        );

        let console = resolver.resolve("vm1").await.unwrap();
        assert_eq!(console.url, "https://10.0.0.5:6080/console");
    }

    #[tokio::test]
    async fn passes_instance_and_reads_stderr() {
        let tmp = TempDir::new().unwrap();
        let resolver = resolver(&tmp, "echo \"http://console/$1\" >&2\nexit 1");

        let console = resolver.resolve("vm1").await.unwrap();
        assert_eq!(console.url, "http://console/vm1");
        assert!(console.stdout.is_empty());
    }

    #[tokio::test]
    async fn no_url_reports_both_streams() {
        let tmp = TempDir::new().unwrap();
        let resolver = resolver(&tmp, "echo 'instance vm1 not found'\necho 'auth ok' >&2");

        let err = resolver.resolve("vm1").await.unwrap_err();
        assert_eq!(err.diagnostics(), Some(("instance vm1 not found", "auth ok")));
        assert!(matches!(err, ControlError::ConsoleUrlNotFound { instance, .. } if instance == "vm1"));
    }

    #[tokio::test]
    async fn empty_instance_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let resolver = resolver(&tmp, "echo http://never");

        let err = resolver.resolve("  ").await.unwrap_err();
        assert!(matches!(err, ControlError::InvalidArgument(_)));
    }
}
