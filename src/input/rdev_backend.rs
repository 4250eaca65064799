//! rdev-based input capture backend
//! Works on Windows, macOS, and Linux (X11)

use crate::data::RawKey;
use crate::input::{InputBackend, KeyAction};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// rdev-based input capture backend
pub struct RdevBackend {
    capturing: Arc<AtomicBool>,
}

impl RdevBackend {
    /// Create a new rdev backend
    pub fn new() -> Self {
        Self {
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for RdevBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBackend for RdevBackend {
    fn start(&mut self, tx: mpsc::UnboundedSender<KeyAction>) -> Result<()> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            return Ok(()); // Already capturing
        }
        let capturing = self.capturing.clone();

        thread::spawn(move || {
            // Keep TSM lookups off the event tap thread on macOS
            rdev::set_is_main_thread(false);

            info!("rdev input capture started");

            let callback = move |event: rdev::Event| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }

                let action = match event.event_type {
                    rdev::EventType::KeyPress(key) => KeyAction::Press(raw_key(key)),
                    rdev::EventType::KeyRelease(key) => KeyAction::Release(raw_key(key)),
                    _ => return,
                };

                if tx.send(action).is_err() {
                    // The session is over; stop forwarding
                    debug!("Input receiver dropped, muting rdev callback");
                    capturing.store(false, Ordering::SeqCst);
                }
            };

            // Run the event listener
            if let Err(e) = rdev::listen(callback) {
                error!("rdev listen error: {:?}", e);
            }

            info!("rdev input capture stopped");
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "rdev"
    }
}

/// Translate an rdev key into a raw identity.
///
/// Letter and digit keys carry their character; everything else carries a
/// lower-case special-key name. Release events carry no text in rdev, so the
/// character is derived from the physical key rather than `Event::name`.
pub(crate) fn raw_key(key: rdev::Key) -> RawKey {
    use rdev::Key as K;

    let c = match key {
        K::KeyA => Some('a'),
        K::KeyB => Some('b'),
        K::KeyC => Some('c'),
        K::KeyD => Some('d'),
        K::KeyE => Some('e'),
        K::KeyF => Some('f'),
        K::KeyG => Some('g'),
        K::KeyH => Some('h'),
        K::KeyI => Some('i'),
        K::KeyJ => Some('j'),
        K::KeyK => Some('k'),
        K::KeyL => Some('l'),
        K::KeyM => Some('m'),
        K::KeyN => Some('n'),
        K::KeyO => Some('o'),
        K::KeyP => Some('p'),
        K::KeyQ => Some('q'),
        K::KeyR => Some('r'),
        K::KeyS => Some('s'),
        K::KeyT => Some('t'),
        K::KeyU => Some('u'),
        K::KeyV => Some('v'),
        K::KeyW => Some('w'),
        K::KeyX => Some('x'),
        K::KeyY => Some('y'),
        K::KeyZ => Some('z'),
        K::Num0 => Some('0'),
        K::Num1 => Some('1'),
        K::Num2 => Some('2'),
        K::Num3 => Some('3'),
        K::Num4 => Some('4'),
        K::Num5 => Some('5'),
        K::Num6 => Some('6'),
        K::Num7 => Some('7'),
        K::Num8 => Some('8'),
        K::Num9 => Some('9'),
        _ => None,
    };
    if let Some(c) = c {
        return RawKey::char(c);
    }

    let name = match key {
        K::Escape => "esc",
        K::Return | K::KpReturn => "enter",
        K::LeftArrow => "left",
        K::RightArrow => "right",
        K::UpArrow => "up",
        K::DownArrow => "down",
        K::Space => "space",
        K::Tab => "tab",
        K::Backspace => "backspace",
        K::ShiftLeft => "shift",
        K::ShiftRight => "shift_r",
        K::ControlLeft => "ctrl_l",
        K::ControlRight => "ctrl_r",
        K::Alt => "alt_l",
        K::AltGr => "alt_gr",
        K::F1 => "f1",
        K::F2 => "f2",
        K::F3 => "f3",
        K::F4 => "f4",
        K::F5 => "f5",
        K::F6 => "f6",
        K::F7 => "f7",
        K::F8 => "f8",
        K::F9 => "f9",
        K::F10 => "f10",
        K::F11 => "f11",
        K::F12 => "f12",
        K::Unknown(code) => return RawKey::unknown(code),
        other => return RawKey::named(format!("{:?}", other).to_lowercase()),
    };
    RawKey::named(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Key;

    #[test]
    fn test_letter_keys_carry_chars() {
        assert_eq!(raw_key(rdev::Key::KeyX), RawKey::char('x'));
        assert_eq!(raw_key(rdev::Key::KeyX).resolve(), Some(Key::X));
        assert_eq!(raw_key(rdev::Key::KeyQ).resolve(), None);
    }

    #[test]
    fn test_special_keys_carry_names() {
        assert_eq!(raw_key(rdev::Key::LeftArrow).resolve(), Some(Key::Left));
        assert_eq!(raw_key(rdev::Key::Return).resolve(), Some(Key::Enter));
        assert_eq!(raw_key(rdev::Key::Escape), RawKey::named("esc"));
        assert_eq!(raw_key(rdev::Key::F9), RawKey::named("f9"));
        assert_eq!(raw_key(rdev::Key::Unknown(42)), RawKey::unknown(42));
    }

    #[test]
    fn test_config_strings_match_native_keys() {
        assert!(raw_key(rdev::Key::F10).matches(&RawKey::parse("f10")));
        assert!(raw_key(rdev::Key::Num1).matches(&RawKey::parse("1")));
        assert!(raw_key(rdev::Key::Home).matches(&RawKey::parse("Home")));
    }
}
