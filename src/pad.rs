//! Key to controller signal mapping
//!
//! Pure lookup used downstream of recording, when replaying a log into the
//! emulator's controller input.

use std::fmt;

use crate::data::{Key, Record, KEY_COUNT};

/// Emulated controller button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Z,
    Start,
}

/// Emulated analog stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stick {
    Main,
}

/// Output signal a key drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadSignal {
    Button(Button),
    Stick(Stick),
}

impl fmt::Display for PadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadSignal::Button(b) => write!(f, "button {:?}", b),
            PadSignal::Stick(s) => write!(f, "stick {:?}", s),
        }
    }
}

/// Map a key to the signal it drives. Press or release is carried next to
/// the signal (see `PadTransition`), since both drive the same output.
/// Returns None for keys with no controller mapping.
pub fn convert_key(key: Key) -> Option<PadSignal> {
    let signal = match key {
        Key::X => PadSignal::Button(Button::A),
        Key::Z => PadSignal::Button(Button::B),
        Key::C => PadSignal::Button(Button::X),
        Key::S => PadSignal::Button(Button::Y),
        Key::D => PadSignal::Button(Button::Z),
        Key::Enter => PadSignal::Button(Button::Start),
        Key::Left | Key::Right | Key::Up | Key::Down => PadSignal::Stick(Stick::Main),
    };
    Some(signal)
}

/// A key changing state between two consecutive records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadTransition {
    pub count: u64,
    pub key: Key,
    pub pressed: bool,
    pub signal: Option<PadSignal>,
}

/// Tracks which keys are held across a sequence of records
#[derive(Debug, Default)]
pub struct PadTracker {
    held: [bool; KEY_COUNT],
}

impl PadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next record, returning the keys that changed
    pub fn update(&mut self, record: &Record) -> Vec<PadTransition> {
        let mut transitions = Vec::new();
        for key in Key::ALL {
            let pressed = record.presses.is_pressed(key);
            if self.held[key.index()] != pressed {
                self.held[key.index()] = pressed;
                transitions.push(PadTransition {
                    count: record.count,
                    key,
                    pressed,
                    signal: convert_key(key),
                });
            }
        }
        transitions
    }

    #[cfg(test)]
    pub fn is_held(&self, key: Key) -> bool {
        self.held[key.index()]
    }
}
