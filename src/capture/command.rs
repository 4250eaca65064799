//! Frame capture by running an external command
//!
//! Typically a tool that sends the emulator its screenshot hotkey, which is
//! why that hotkey is reserved and never recorded by the listener.

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::debug;

use super::FrameCapture;
use crate::config::CommandCaptureConfig;

/// Placeholder in arguments replaced with the frame number
const FRAME_PLACEHOLDER: &str = "{frame}";

pub struct CommandFrameCapture {
    program: String,
    args: Vec<String>,
}

impl CommandFrameCapture {
    pub fn new(config: &CommandCaptureConfig) -> Result<Self> {
        if config.program.trim().is_empty() {
            bail!("capture.command.program must be set when capture.backend = \"command\"");
        }
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
        })
    }
}

impl FrameCapture for CommandFrameCapture {
    fn capture_frame(&self, frame: u64) -> Result<()> {
        let args = self
            .args
            .iter()
            .map(|a| a.replace(FRAME_PLACEHOLDER, &frame.to_string()));

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run capture command {:?}", self.program))?;

        if !output.status.success() {
            bail!(
                "Capture command {:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!("Captured frame {} via {}", frame, self.program);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(program: &str, args: &[&str]) -> CommandCaptureConfig {
        CommandCaptureConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_program_is_rejected() {
        assert!(CommandFrameCapture::new(&config("  ", &[])).is_err());
    }

    #[test]
    fn test_command_runs_with_frame_number() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("frame_{frame}");
        let capture =
            CommandFrameCapture::new(&config("touch", &[target.to_str().unwrap()])).unwrap();

        capture.capture_frame(1).unwrap();
        capture.capture_frame(2).unwrap();
        assert!(dir.path().join("frame_1").exists());
        assert!(dir.path().join("frame_2").exists());

        // A retried number reuses the same slot
        capture.capture_frame(2).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_failing_command_is_an_error() {
        let capture = CommandFrameCapture::new(&config("false", &[])).unwrap();
        assert!(capture.capture_frame(1).is_err());
    }
}
