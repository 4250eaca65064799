//! Event listener
//!
//! Turns raw key notifications into capture-state updates and detects the
//! stop key. Resolution is an explicit result rather than a lookup failure,
//! so a genuine miss and the stop signal take different paths.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::data::{CaptureState, Key, PersistenceWriter, RawKey, RecordingLog, SaveError, SavedLog};
use crate::input::KeyAction;
use crate::sync::TerminationFlag;

/// How a raw key maps onto the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A key in the identity map
    Resolved(Key),
    /// A key reserved for the emulator (e.g. its screenshot hotkey); never recorded
    Reserved,
    /// The designated stop key
    StopSignal,
    /// Anything else
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Stopped,
}

/// What the caller should do after an event
#[derive(Debug)]
pub enum ListenerSignal {
    Continue,
    Stop(Result<SavedLog, SaveError>),
}

/// Keys with special meaning to the listener
#[derive(Debug, Clone)]
pub struct KeyBindings {
    pub stop_key: RawKey,
    pub reserved: Vec<RawKey>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            stop_key: RawKey::named("esc"),
            reserved: vec![RawKey::named("f9")],
        }
    }
}

impl KeyBindings {
    pub fn resolve(&self, raw: &RawKey) -> Resolution {
        if self.reserved.iter().any(|r| raw.matches(r)) {
            return Resolution::Reserved;
        }
        if let Some(key) = raw.resolve() {
            return Resolution::Resolved(key);
        }
        if raw.matches(&self.stop_key) {
            return Resolution::StopSignal;
        }
        Resolution::Unrecognized
    }
}

pub struct EventListener {
    bindings: KeyBindings,
    state: Arc<CaptureState>,
    log: Arc<RecordingLog>,
    writer: Arc<PersistenceWriter>,
    terminated: TerminationFlag,
    listener_state: ListenerState,
}

impl EventListener {
    pub fn new(
        bindings: KeyBindings,
        state: Arc<CaptureState>,
        log: Arc<RecordingLog>,
        writer: Arc<PersistenceWriter>,
        terminated: TerminationFlag,
    ) -> Self {
        Self {
            bindings,
            state,
            log,
            writer,
            terminated,
            listener_state: ListenerState::Listening,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ListenerState {
        self.listener_state
    }

    /// Dispatch one notification
    pub fn handle(&mut self, action: &KeyAction) -> ListenerSignal {
        if self.listener_state == ListenerState::Stopped {
            debug!("Listener stopped, ignoring {:?}", action);
            return ListenerSignal::Continue;
        }
        match action {
            KeyAction::Press(raw) => {
                self.on_press(raw);
                ListenerSignal::Continue
            }
            KeyAction::Release(raw) => self.on_release(raw),
        }
    }

    pub fn on_press(&mut self, raw: &RawKey) {
        match self.bindings.resolve(raw) {
            Resolution::Resolved(key) => {
                if self.state.set(key, true) {
                    debug!("key {} pressed", key);
                }
            }
            Resolution::Reserved | Resolution::StopSignal => {}
            Resolution::Unrecognized => {
                warn!("Pressed key {} not defined within allowable controller inputs", raw);
            }
        }
    }

    pub fn on_release(&mut self, raw: &RawKey) -> ListenerSignal {
        match self.bindings.resolve(raw) {
            Resolution::Resolved(key) => {
                if self.state.set(key, false) {
                    debug!("key {} released", key);
                }
                ListenerSignal::Continue
            }
            Resolution::StopSignal => {
                info!("Stop key {} released, finishing session", raw);
                ListenerSignal::Stop(self.terminate())
            }
            Resolution::Reserved => ListenerSignal::Continue,
            Resolution::Unrecognized => {
                warn!("Released key {} not defined within allowable controller inputs", raw);
                ListenerSignal::Continue
            }
        }
    }

    /// Terminate the session: raise the flag, persist, stop listening.
    pub fn terminate(&mut self) -> Result<SavedLog, SaveError> {
        self.terminated.set();
        let outcome = self.writer.save(&self.log);
        self.listener_state = ListenerState::Stopped;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Snapshot;

    struct Fixture {
        listener: EventListener,
        state: Arc<CaptureState>,
        log: Arc<RecordingLog>,
        terminated: TerminationFlag,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(CaptureState::new());
        let log = Arc::new(RecordingLog::new());
        let writer = Arc::new(PersistenceWriter::new(dir.path().join("log.json")));
        let terminated = TerminationFlag::new();
        let listener = EventListener::new(
            KeyBindings::default(),
            state.clone(),
            log.clone(),
            writer,
            terminated.clone(),
        );
        Fixture {
            listener,
            state,
            log,
            terminated,
            _dir: dir,
        }
    }

    #[test]
    fn test_resolution_order() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.resolve(&RawKey::char('x')), Resolution::Resolved(Key::X));
        assert_eq!(bindings.resolve(&RawKey::named("f9")), Resolution::Reserved);
        assert_eq!(bindings.resolve(&RawKey::named("esc")), Resolution::StopSignal);
        assert_eq!(bindings.resolve(&RawKey::char('q')), Resolution::Unrecognized);
    }

    #[test]
    fn test_press_and_release_update_state() {
        let mut f = fixture();
        f.listener.handle(&KeyAction::Press(RawKey::char('x')));
        assert!(f.state.is_pressed(Key::X));
        f.listener.handle(&KeyAction::Release(RawKey::char('x')));
        assert!(!f.state.is_pressed(Key::X));
    }

    #[test]
    fn test_unrecognized_key_changes_nothing() {
        let mut f = fixture();
        let before = f.state.snapshot();
        f.listener.handle(&KeyAction::Press(RawKey::char('q')));
        let signal = f.listener.handle(&KeyAction::Release(RawKey::char('q')));
        assert!(matches!(signal, ListenerSignal::Continue));
        assert_eq!(f.state.snapshot(), before);
        assert_eq!(f.listener.state(), ListenerState::Listening);
        assert!(f.log.is_empty());
    }

    #[test]
    fn test_reserved_and_stop_press_are_ignored() {
        let mut f = fixture();
        f.listener.handle(&KeyAction::Press(RawKey::named("f9")));
        f.listener.handle(&KeyAction::Press(RawKey::named("esc")));
        f.listener.handle(&KeyAction::Release(RawKey::named("f9")));
        assert_eq!(f.state.snapshot(), Snapshot::default());
        assert!(!f.terminated.is_set());
        assert_eq!(f.listener.state(), ListenerState::Listening);
    }

    #[test]
    fn test_stop_key_release_terminates_once() {
        let mut f = fixture();
        f.log.append(Snapshot::default());

        let signal = f.listener.handle(&KeyAction::Release(RawKey::named("esc")));
        match signal {
            ListenerSignal::Stop(Ok(saved)) => assert_eq!(saved.records, 1),
            other => panic!("expected a clean stop, got {:?}", other),
        }
        assert!(f.terminated.is_set());
        assert!(f.log.is_sealed());
        assert_eq!(f.listener.state(), ListenerState::Stopped);

        // Terminal: nothing changes afterwards
        f.listener.handle(&KeyAction::Press(RawKey::char('z')));
        assert!(!f.state.is_pressed(Key::Z));
        assert!(matches!(
            f.listener.handle(&KeyAction::Release(RawKey::named("esc"))),
            ListenerSignal::Continue
        ));
    }
}
