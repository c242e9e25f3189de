//! Scenario persistence.
//!
//! Scenarios are stored one per file as `scenario_<key>.json`, where the key is
//! a sanitised form of the submitted name. Saving the same key twice
//! overwrites the earlier document.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::types::{Scenario, UNNAMED_SCENARIO};

/// Turn a user-supplied scenario name into a path-safe file key.
///
/// Every whitespace character becomes `_`, leading and trailing ones included.
/// `:` is dropped, and both path separators become `_`.
/// Control characters are dropped so the key is always a single file name
/// component. Applying it twice gives the same result as applying it once.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let key: String = name
        .chars()
        .filter_map(|c| match c {
            ':' => None,
            '/' | '\\' => Some('_'),
            c if c.is_whitespace() => Some('_'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();

    if key.is_empty() {
        UNNAMED_SCENARIO.to_owned()
    } else {
        key
    }
}

/// File name for a sanitised scenario key.
#[must_use]
pub fn scenario_file_name(key: &str) -> String {
    format!("scenario_{key}.json")
}

/// Named JSON scenario documents on disk, with an immutable fallback.
#[derive(Debug, Clone)]
pub struct ScenarioStore {
    dir: PathBuf,
    default_scenario: Scenario,
}

impl ScenarioStore {
    /// Create a store rooted at `dir` that falls back to `default_scenario`.
    pub fn new(dir: impl Into<PathBuf>, default_scenario: Scenario) -> Self {
        Self {
            dir: dir.into(),
            default_scenario,
        }
    }

    /// Read the fallback scenario from `path`, or use the built-in one.
    ///
    /// Intended to be called once at startup; the result is passed to
    /// [`ScenarioStore::new`].
    pub async fn load_default(path: &Path) -> Scenario {
        let parsed = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(ControlError::from)
                .and_then(Scenario::from_value),
            Err(e) => Err(ControlError::Io(e)),
        };

        match parsed {
            Ok(scenario) => {
                info!(path = %path.display(), "loaded default scenario");
                scenario
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "default scenario unavailable, using built-in"
                );
                Scenario::builtin_default()
            }
        }
    }

    /// Directory the store writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The fallback scenario.
    #[must_use]
    pub const fn default_scenario(&self) -> &Scenario {
        &self.default_scenario
    }

    /// Path a scenario name maps to.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(scenario_file_name(&sanitize_name(name)))
    }

    /// Persist `scenario` under `name` as pretty-printed JSON.
    ///
    /// Creates the storage directory if needed and overwrites any existing
    /// document with the same key.
    pub async fn save(&self, name: &str, scenario: &Scenario) -> ControlResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(name);
        let text = serde_json::to_string_pretty(scenario.as_value())?;
        tokio::fs::write(&path, text.as_bytes()).await?;

        info!(scenario = %name, path = %path.display(), "scenario saved");
        Ok(path)
    }

    /// Read the scenario stored under `name`.
    ///
    /// `name` is sanitised the same way as in [`ScenarioStore::save`], so both
    /// the submitted name and its sanitised key resolve to the same file.
    pub async fn load(&self, name: &str) -> ControlResult<Scenario> {
        let path = self.path_for(name);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "scenario file missing");
                return Err(ControlError::ScenarioNotFound(name.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| ControlError::InvalidFormat {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // Stored documents were objects when saved; anything else was edited by hand.
        Scenario::from_value(value).map_err(|_| ControlError::InvalidFormat {
            path,
            reason: "expected a JSON object".to_owned(),
        })
    }
}
