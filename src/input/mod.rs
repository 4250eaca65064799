//! Input capture backends and the key event listener

mod backend;
mod listener;
pub(crate) mod rdev_backend;

#[cfg(target_os = "linux")]
pub(crate) mod evdev_backend;

pub use backend::*;
pub use listener::{EventListener, KeyBindings, ListenerSignal};
