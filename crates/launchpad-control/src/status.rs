//! Durable deployment status record.
//!
//! There is exactly one record system-wide. Every write replaces the whole
//! document through a temp file and rename, so readers never observe a
//! partially written record.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::types::StatusRecord;

/// Accessor for the persisted [`StatusRecord`] and the last-deployment pid marker.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
    pid_file: PathBuf,
}

impl StatusStore {
    /// Create an accessor for the record at `path` and the pid marker at `pid_file`.
    pub fn new(path: impl Into<PathBuf>, pid_file: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid_file: pid_file.into(),
        }
    }

    /// Location of the status record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the pid marker.
    #[must_use]
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// Read the current record.
    ///
    /// Fails with [`ControlError::StatusNotFound`] if no deployment was ever
    /// launched and [`ControlError::CorruptState`] if the file does not parse.
    pub async fn read(&self) -> ControlResult<StatusRecord> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ControlError::StatusNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| ControlError::CorruptState(e.to_string()))
    }

    /// Replace the record.
    pub async fn write(&self, record: &StatusRecord) -> ControlResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let text = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            status = %record.status,
            pid = ?record.pid,
            "status record written"
        );
        Ok(())
    }

    /// Persist the pid of the last launched deployment for external tooling.
    pub async fn write_pid(&self, pid: u32) -> ControlResult<()> {
        if let Some(parent) = self.pid_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.pid_file, pid.to_string()).await?;
        Ok(())
    }

    /// Read the pid marker, if present and numeric.
    pub async fn read_pid(&self) -> ControlResult<Option<u32>> {
        match tokio::fs::read_to_string(&self.pid_file).await {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
