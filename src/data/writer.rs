//! Persistence writer
//!
//! Seals the recording log and writes it to a single JSON artifact. The
//! outcome of the first call is memoized: any later call returns it without
//! touching the filesystem.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use super::format::RecordingLog;

/// Persistence failures surfaced to whoever triggered termination
#[derive(Debug, Clone, Error)]
pub enum SaveError {
    #[error("failed to serialize recording log: {0}")]
    Serialize(String),

    #[error("failed to write {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("an earlier save already failed: {0}")]
    PreviouslyFailed(Box<SaveError>),
}

/// Result of a successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedLog {
    pub path: PathBuf,
    pub records: usize,
}

pub struct PersistenceWriter {
    path: PathBuf,
    outcome: Mutex<Option<Result<SavedLog, SaveError>>>,
}

impl PersistenceWriter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            outcome: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a save has been attempted
    #[cfg(test)]
    pub fn has_saved(&self) -> bool {
        self.outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Seal `log` and write it out. Only the first call does any work.
    pub fn save(&self, log: &RecordingLog) -> Result<SavedLog, SaveError> {
        let mut outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = outcome.as_ref() {
            warn!("Recording log already saved, ignoring repeated save");
            return previous
                .clone()
                .map_err(|e| SaveError::PreviouslyFailed(Box::new(e)));
        }

        let result = self.write(log);
        match &result {
            Ok(saved) => info!("Saved {} records to {:?}", saved.records, saved.path),
            Err(e) => error!("Failed to save recording log: {}", e),
        }
        *outcome = Some(result.clone());
        result
    }

    fn write(&self, log: &RecordingLog) -> Result<SavedLog, SaveError> {
        let document = log.seal();
        let bytes = document
            .to_json()
            .map_err(|e| SaveError::Serialize(e.to_string()))?;

        let io_err = |path: &Path, e: std::io::Error| SaveError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        // Write beside the target and rename, so a failure never truncates
        // an artifact that is already on disk.
        let tmp_path = self.path.with_extension("json.tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(&tmp_path, e));
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| io_err(&self.path, e))?;

        Ok(SavedLog {
            path: self.path.clone(),
            records: document.len(),
        })
    }
}
