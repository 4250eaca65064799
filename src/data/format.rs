//! Recording log and the persisted artifact format

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

use super::state::Snapshot;

/// One sampled snapshot, numbered in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Sequence number, strictly increasing from 1
    pub count: u64,

    /// Key flags at the time of the tick
    pub presses: Snapshot,
}

/// The persisted artifact: `{"data": [record, ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDocument {
    pub data: Vec<Record>,
}

/// Errors reading a persisted artifact back
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed log document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record {index} has count {found}, expected {expected}")]
    NonContiguous {
        index: usize,
        expected: u64,
        found: u64,
    },
}

impl LogDocument {
    /// Serialize to the compact JSON artifact
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse an artifact, checking that counts run 1..=N without gaps
    pub fn from_json(bytes: &[u8]) -> Result<Self, FormatError> {
        let doc: LogDocument = serde_json::from_slice(bytes)?;
        for (index, record) in doc.data.iter().enumerate() {
            let expected = index as u64 + 1;
            if record.count != expected {
                return Err(FormatError::NonContiguous {
                    index,
                    expected,
                    found: record.count,
                });
            }
        }
        Ok(doc)
    }

    /// Load an artifact from disk
    pub fn load(path: &Path) -> Result<Self, FormatError> {
        let bytes = std::fs::read(path).map_err(|source| FormatError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&bytes)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
struct LogInner {
    records: Vec<Record>,
    next_count: u64,
    sealed: bool,
}

/// Append-only log shared by every sampler tick.
///
/// The count is assigned inside the same critical section as the push, so
/// counts reflect append order even when ticks overlap.
#[derive(Debug)]
pub struct RecordingLog {
    inner: Mutex<LogInner>,
}

impl Default for RecordingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                records: Vec::new(),
                next_count: 1,
                sealed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        // A panicking tick cannot leave the log half-written, so keep going
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a snapshot. Returns the assigned count, or None once sealed.
    pub fn append(&self, presses: Snapshot) -> Option<u64> {
        let mut inner = self.lock();
        if inner.sealed {
            debug!("Recording log sealed, dropping late snapshot");
            return None;
        }
        let count = inner.next_count;
        inner.records.push(Record { count, presses });
        inner.next_count += 1;
        Some(count)
    }

    /// Count the next append will get, or None once sealed
    pub fn next_count(&self) -> Option<u64> {
        let inner = self.lock();
        (!inner.sealed).then_some(inner.next_count)
    }

    /// Seal the log and return its contents. No append succeeds afterwards.
    pub fn seal(&self) -> LogDocument {
        let mut inner = self.lock();
        inner.sealed = true;
        LogDocument {
            data: inner.records.clone(),
        }
    }

    #[cfg(test)]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents without sealing
    #[cfg(test)]
    pub fn document(&self) -> LogDocument {
        LogDocument {
            data: self.lock().records.clone(),
        }
    }
}
