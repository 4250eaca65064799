//! Data structures for captured key state and the persisted log

mod format;
mod keys;
mod state;
mod writer;

pub use format::{FormatError, LogDocument, Record, RecordingLog};
pub use keys::{Key, RawKey, KEY_COUNT};
pub use state::{CaptureState, Snapshot};
pub use writer::{PersistenceWriter, SaveError, SavedLog};
