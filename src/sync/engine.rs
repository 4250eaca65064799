//! Recording engine
//!
//! Owns one session: wires the shared capture state into the listener and
//! the sampler, drives the listener from the input channel until the stop
//! key, then waits for in-flight ticks to drain.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::sampler::Sampler;
use super::scheduler::{Scheduler, TokioScheduler};
use super::{SessionOutcome, TerminationFlag};
use crate::capture::FrameCapture;
use crate::data::{CaptureState, PersistenceWriter, RecordingLog};
use crate::input::{EventListener, InputBackend, KeyAction, KeyBindings, ListenerSignal};

pub struct RecordingEngine {
    session_id: String,
    interval: Duration,
    bindings: KeyBindings,
    log_path: PathBuf,
    input_backend: Box<dyn InputBackend>,
    frame_capture: Arc<dyn FrameCapture>,
    scheduler: Option<Arc<dyn Scheduler>>,
    input_tx: mpsc::UnboundedSender<KeyAction>,
    /// Input receiver (taken once when run() starts)
    input_rx: Option<mpsc::UnboundedReceiver<KeyAction>>,
}

impl RecordingEngine {
    /// Create an engine for one session. `log_path` is where the artifact goes.
    pub fn new(
        session_id: String,
        interval: Duration,
        bindings: KeyBindings,
        log_path: PathBuf,
        input_backend: Box<dyn InputBackend>,
        frame_capture: Arc<dyn FrameCapture>,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            interval,
            bindings,
            log_path,
            input_backend,
            frame_capture,
            scheduler: None,
            input_tx,
            input_rx: Some(input_rx),
        }
    }

    /// Use a specific scheduler instead of the tokio timer
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sender into the listener's event stream, for synthetic events such
    /// as a Ctrl+C mapped onto the stop key.
    pub fn input_sender(&self) -> mpsc::UnboundedSender<KeyAction> {
        self.input_tx.clone()
    }

    /// Run the session on `handle`, blocking the caller until it ends
    pub fn start(&mut self, handle: &Handle) -> Result<SessionOutcome> {
        handle.block_on(self.run())
    }

    /// Run the session to completion
    pub async fn run(&mut self) -> Result<SessionOutcome> {
        let mut input_rx = self
            .input_rx
            .take()
            .context("Recording engine already ran a session")?;

        info!(
            "Recording session {} starting (interval {:?}, stop key {}, frames via {})",
            self.session_id,
            self.interval,
            self.bindings.stop_key,
            self.frame_capture.name()
        );

        let scheduler: Arc<dyn Scheduler> = match self.scheduler.clone() {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current()?),
        };

        let state = Arc::new(CaptureState::new());
        let log = Arc::new(RecordingLog::new());
        let writer = Arc::new(PersistenceWriter::new(self.log_path.clone()));
        info!("Log will be saved to {:?}", writer.path());
        let terminated = TerminationFlag::new();

        let mut listener = EventListener::new(
            self.bindings.clone(),
            state.clone(),
            log.clone(),
            writer,
            terminated.clone(),
        );
        let sampler = Sampler::new(
            self.interval,
            state,
            log.clone(),
            self.frame_capture.clone(),
            scheduler,
            terminated,
        );

        self.input_backend
            .start(self.input_tx.clone())
            .with_context(|| format!("Failed to start {} input backend", self.input_backend.name()))?;
        sampler.start();

        let result = loop {
            match input_rx.recv().await {
                Some(action) => {
                    if let ListenerSignal::Stop(result) = listener.handle(&action) {
                        break result;
                    }
                }
                None => {
                    warn!("Input stream ended before the stop key, saving what was recorded");
                    break listener.terminate();
                }
            }
        };

        sampler.wait_idle().await;

        if log.is_empty() {
            warn!("Session ended before the first sample was taken");
        }
        if sampler.failed_captures() > 0 {
            warn!("{} ticks skipped after frame capture failures", sampler.failed_captures());
        }
        info!(
            "Recording session {} finished with {} records",
            self.session_id,
            log.len()
        );

        Ok(SessionOutcome::from(result))
    }
}
