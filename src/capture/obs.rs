//! Frame capture through obs-websocket screenshots

use anyhow::{Context, Result};
use base64::Engine;
use obws::Client;
use std::path::PathBuf;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::FrameCapture;
use crate::config::ObsCaptureConfig;

/// Average luma below which a frame counts as black
const BLACK_FRAME_THRESHOLD: u64 = 10;

/// Saves a screenshot of the current OBS program scene per tick
pub struct ObsFrameCapture {
    client: Client,
    handle: Handle,
    frames_dir: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
}

impl ObsFrameCapture {
    /// Connect to OBS and prepare the frames directory
    pub async fn connect(config: &ObsCaptureConfig, frames_dir: PathBuf) -> Result<Self> {
        let client = Client::connect(&config.host, config.port, config.password.as_deref())
            .await
            .context("Failed to connect to OBS WebSocket")?;

        std::fs::create_dir_all(&frames_dir)
            .with_context(|| format!("Failed to create frames directory: {:?}", frames_dir))?;

        info!(
            "Connected to OBS at {}:{}, frames go to {:?}",
            config.host, config.port, frames_dir
        );

        Ok(Self {
            client,
            handle: Handle::current(),
            frames_dir,
            width: config.width,
            height: config.height,
        })
    }

    fn frame_path(&self, frame: u64) -> PathBuf {
        self.frames_dir.join(format!("frame_{:06}.png", frame))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let scene = self.client.scenes().current_program_scene().await?;

        let screenshot = self
            .client
            .sources()
            .take_screenshot(obws::requests::sources::TakeScreenshot {
                source: scene.id.name.as_str().into(),
                width: self.width,
                height: self.height,
                format: "png",
                compression_quality: None,
            })
            .await?;

        // OBS returns a data URI
        let encoded = screenshot
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(&screenshot);

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("Failed to decode screenshot")
    }
}

impl FrameCapture for ObsFrameCapture {
    fn capture_frame(&self, frame: u64) -> Result<()> {
        // Ticks run on the blocking pool, so blocking on the runtime is allowed here
        let bytes = self.handle.block_on(self.screenshot())?;

        match is_black_frame(&bytes) {
            Ok(true) => warn!("Frame {} is black; is the emulator rendering?", frame),
            Ok(false) => {}
            Err(e) => warn!("Could not analyze frame {}: {}", frame, e),
        }

        let path = self.frame_path(frame);
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write frame: {:?}", path))?;
        debug!("Captured frame {} to {:?}", frame, path);
        Ok(())
    }

    fn discard_frame(&self, frame: u64) {
        let path = self.frame_path(frame);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Could not remove unrecorded frame {:?}: {}", path, e);
        }
    }

    fn name(&self) -> &'static str {
        "obs"
    }
}

/// Whether an encoded image is mostly black
fn is_black_frame(bytes: &[u8]) -> Result<bool> {
    let img = image::load_from_memory(bytes).context("Failed to load screenshot image")?;

    let gray = img.to_luma8();
    let pixel_count = gray.width() as u64 * gray.height() as u64;
    if pixel_count == 0 {
        return Ok(true);
    }
    let total_brightness: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    Ok(total_brightness / pixel_count < BLACK_FRAME_THRESHOLD)
}
