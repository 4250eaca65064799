//! Input capture backend trait

use crate::data::RawKey;
use anyhow::Result;
use tokio::sync::mpsc;

/// A key notification from the OS input subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Press(RawKey),
    Release(RawKey),
}

/// Trait for input capture backends
pub trait InputBackend: Send {
    /// Start capturing key events on a backend-owned thread.
    /// Events are sent to the provided channel until the receiver is dropped.
    fn start(&mut self, tx: mpsc::UnboundedSender<KeyAction>) -> Result<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Create the appropriate input backend for the current platform
pub fn create_input_backend() -> Box<dyn InputBackend> {
    #[cfg(target_os = "linux")]
    {
        // Check if we're on Wayland
        if std::env::var("XDG_SESSION_TYPE").map(|s| s == "wayland").unwrap_or(false) {
            // Try evdev backend for Wayland
            match super::evdev_backend::EvdevBackend::new() {
                Ok(backend) => {
                    tracing::info!("Using evdev backend for Wayland");
                    return Box::new(backend);
                }
                Err(e) => {
                    tracing::warn!(
                        "evdev backend failed ({}), falling back to rdev (may not work on Wayland)",
                        e
                    );
                }
            }
        }
    }

    // Default to rdev backend
    tracing::info!("Using rdev backend for input capture");
    Box::new(super::rdev_backend::RdevBackend::new())
}
