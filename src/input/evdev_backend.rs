//! evdev-based input capture backend for Linux Wayland
//! Requires user to be in the 'input' group

use crate::data::RawKey;
use crate::input::{InputBackend, KeyAction};
use anyhow::Result;
use evdev::{Device, InputEventKind, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct EvdevBackend {
    devices: Vec<Device>,
    capturing: Arc<AtomicBool>,
}

impl EvdevBackend {
    /// Create a new evdev backend
    /// This will enumerate input devices and keep the ones with keys
    pub fn new() -> Result<Self> {
        let mut devices = Vec::new();

        for entry in std::fs::read_dir("/dev/input")? {
            let entry = entry?;
            let path = entry.path();

            if !path.to_string_lossy().contains("event") {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    let name = device.name().unwrap_or("Unknown");
                    if device.supported_keys().is_some() {
                        info!("Found input device: {} ({:?})", name, path);
                        devices.push(device);
                    }
                }
                Err(e) => {
                    debug!("Could not open {:?}: {}", path, e);
                }
            }
        }

        if devices.is_empty() {
            anyhow::bail!("No keyboard devices found. Make sure you are in the 'input' group.");
        }

        Ok(Self {
            devices,
            capturing: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl InputBackend for EvdevBackend {
    fn start(&mut self, tx: mpsc::UnboundedSender<KeyAction>) -> Result<()> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Take ownership of devices for the threads
        let devices = std::mem::take(&mut self.devices);

        for mut device in devices {
            let tx = tx.clone();
            let capturing = self.capturing.clone();

            thread::spawn(move || {
                let device_name = device.name().unwrap_or("Unknown").to_string();
                info!("Started evdev capture for: {}", device_name);

                while capturing.load(Ordering::SeqCst) {
                    match device.fetch_events() {
                        Ok(events) => {
                            for ev in events {
                                let InputEventKind::Key(key) = ev.kind() else {
                                    continue;
                                };
                                let action = match ev.value() {
                                    1 => KeyAction::Press(raw_key(key)),
                                    0 => KeyAction::Release(raw_key(key)),
                                    _ => continue, // Key repeat, ignore
                                };
                                if tx.send(action).is_err() {
                                    capturing.store(false, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("evdev fetch error for {}: {}", device_name, e);
                            thread::sleep(std::time::Duration::from_millis(100));
                        }
                    }
                }

                info!("Stopped evdev capture for: {}", device_name);
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "evdev"
    }
}

/// Translate an evdev key code into a raw identity
fn raw_key(key: Key) -> RawKey {
    let c = match key {
        Key::KEY_A => Some('a'),
        Key::KEY_B => Some('b'),
        Key::KEY_C => Some('c'),
        Key::KEY_D => Some('d'),
        Key::KEY_E => Some('e'),
        Key::KEY_F => Some('f'),
        Key::KEY_G => Some('g'),
        Key::KEY_H => Some('h'),
        Key::KEY_I => Some('i'),
        Key::KEY_J => Some('j'),
        Key::KEY_K => Some('k'),
        Key::KEY_L => Some('l'),
        Key::KEY_M => Some('m'),
        Key::KEY_N => Some('n'),
        Key::KEY_O => Some('o'),
        Key::KEY_P => Some('p'),
        Key::KEY_Q => Some('q'),
        Key::KEY_R => Some('r'),
        Key::KEY_S => Some('s'),
        Key::KEY_T => Some('t'),
        Key::KEY_U => Some('u'),
        Key::KEY_V => Some('v'),
        Key::KEY_W => Some('w'),
        Key::KEY_X => Some('x'),
        Key::KEY_Y => Some('y'),
        Key::KEY_Z => Some('z'),
        Key::KEY_0 => Some('0'),
        Key::KEY_1 => Some('1'),
        Key::KEY_2 => Some('2'),
        Key::KEY_3 => Some('3'),
        Key::KEY_4 => Some('4'),
        Key::KEY_5 => Some('5'),
        Key::KEY_6 => Some('6'),
        Key::KEY_7 => Some('7'),
        Key::KEY_8 => Some('8'),
        Key::KEY_9 => Some('9'),
        _ => None,
    };
    if let Some(c) = c {
        return RawKey::char(c);
    }

    let name = match key {
        Key::KEY_ESC => "esc",
        Key::KEY_ENTER | Key::KEY_KPENTER => "enter",
        Key::KEY_LEFT => "left",
        Key::KEY_RIGHT => "right",
        Key::KEY_UP => "up",
        Key::KEY_DOWN => "down",
        Key::KEY_SPACE => "space",
        Key::KEY_TAB => "tab",
        Key::KEY_BACKSPACE => "backspace",
        Key::KEY_LEFTSHIFT => "shift",
        Key::KEY_RIGHTSHIFT => "shift_r",
        Key::KEY_LEFTCTRL => "ctrl_l",
        Key::KEY_RIGHTCTRL => "ctrl_r",
        Key::KEY_LEFTALT => "alt_l",
        Key::KEY_RIGHTALT => "alt_gr",
        Key::KEY_F1 => "f1",
        Key::KEY_F2 => "f2",
        Key::KEY_F3 => "f3",
        Key::KEY_F4 => "f4",
        Key::KEY_F5 => "f5",
        Key::KEY_F6 => "f6",
        Key::KEY_F7 => "f7",
        Key::KEY_F8 => "f8",
        Key::KEY_F9 => "f9",
        Key::KEY_F10 => "f10",
        Key::KEY_F11 => "f11",
        Key::KEY_F12 => "f12",
        Key::KEY_HOME => "home",
        Key::KEY_END => "end",
        Key::KEY_PAGEUP => "pageup",
        Key::KEY_PAGEDOWN => "pagedown",
        Key::KEY_INSERT => "insert",
        Key::KEY_DELETE => "delete",
        Key::KEY_CAPSLOCK => "capslock",
        // Same shape as rdev's fallback: the lower-cased key name
        _ => {
            let debug = format!("{:?}", key);
            return match debug.strip_prefix("KEY_") {
                Some(name) => RawKey::named(name.to_lowercase()),
                None => RawKey::unknown(key.code() as u32),
            };
        }
    };
    RawKey::named(name)
}
