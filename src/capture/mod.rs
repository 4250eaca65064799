//! Frame capture collaborators
//!
//! The sampler calls `capture_frame` once per tick with the count the
//! record will get. By the time it returns, exactly one frame has been
//! stored under that number as a side effect.

mod command;
mod obs;

use anyhow::Result;
use std::path::Path;

use crate::config::{CaptureBackend, CaptureConfig};

pub use command::CommandFrameCapture;
pub use obs::ObsFrameCapture;

/// Synchronous, side-effecting frame grab
pub trait FrameCapture: Send + Sync {
    /// Capture and store frame number `frame`
    fn capture_frame(&self, frame: u64) -> Result<()>;

    /// Remove a stored frame whose record was never appended
    fn discard_frame(&self, _frame: u64) {}

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Records input state only
#[derive(Debug, Default)]
pub struct NoopFrameCapture;

impl FrameCapture for NoopFrameCapture {
    fn capture_frame(&self, _frame: u64) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the configured frame capture, writing frames under `session_dir`
pub async fn create_frame_capture(
    config: &CaptureConfig,
    session_dir: &Path,
) -> Result<Box<dyn FrameCapture>> {
    let capture: Box<dyn FrameCapture> = match config.backend {
        CaptureBackend::None => Box::new(NoopFrameCapture),
        CaptureBackend::Command => Box::new(CommandFrameCapture::new(&config.command)?),
        CaptureBackend::Obs => {
            Box::new(ObsFrameCapture::connect(&config.obs, session_dir.join("frames")).await?)
        }
    };
    tracing::info!("Using {} frame capture", capture.name());
    Ok(capture)
}
