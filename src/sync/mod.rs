//! Recording session - arbitrates between the key listener and the sampler

mod engine;
mod sampler;
mod scheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::data::{SaveError, SavedLog};

pub use engine::RecordingEngine;
pub use scheduler::{Scheduler, TokioScheduler};

/// Set once by the listener, read by every tick.
///
/// SeqCst on both sides: a tick that starts after the store is guaranteed
/// to see it.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Stop key released and the log was persisted
    Completed(SavedLog),
    /// Stop key released but the log could not be written
    PersistenceFailed(SaveError),
}

impl SessionOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Completed(_) => 0,
            SessionOutcome::PersistenceFailed(_) => 2,
        }
    }
}

impl From<Result<SavedLog, SaveError>> for SessionOutcome {
    fn from(result: Result<SavedLog, SaveError>) -> Self {
        match result {
            Ok(saved) => SessionOutcome::Completed(saved),
            Err(e) => SessionOutcome::PersistenceFailed(e),
        }
    }
}
