//! keylog Agent
//!
//! Samples keyboard state at a fixed cadence in lockstep with emulator frame
//! captures, and saves the sequence as a labeled dataset for training.

mod capture;
mod config;
mod data;
mod input;
mod inspect;
mod logging;
mod pad;
mod sync;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{CaptureBackend, Config};
use input::{create_input_backend, KeyAction};
use sync::{RecordingEngine, SessionOutcome};

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct Args {
    help: bool,
    inspect: Option<PathBuf>,
    config: Option<PathBuf>,
    interval_ms: Option<u64>,
    output: Option<PathBuf>,
    capture: Option<CaptureBackend>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{} requires a value", flag))
            };
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "-c" | "--config" => parsed.config = Some(PathBuf::from(value(&arg)?)),
                "-i" | "--interval-ms" => {
                    let raw = value(&arg)?;
                    let ms = raw
                        .parse()
                        .with_context(|| format!("Invalid interval {:?}", raw))?;
                    parsed.interval_ms = Some(ms);
                }
                "-o" | "--output" => parsed.output = Some(PathBuf::from(value(&arg)?)),
                "--capture" => {
                    let raw = value(&arg)?;
                    parsed.capture = Some(match raw.as_str() {
                        "none" => CaptureBackend::None,
                        "obs" => CaptureBackend::Obs,
                        "command" => CaptureBackend::Command,
                        other => bail!("Unknown capture backend {:?}", other),
                    });
                }
                "inspect" => {
                    let path = value(&arg)?;
                    parsed.inspect = Some(PathBuf::from(path));
                }
                other => bail!("Unknown argument {:?} (see --help)", other),
            }
        }
        Ok(parsed)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(ms) = self.interval_ms {
            config.recording.interval_ms = ms;
        }
        if let Some(output) = &self.output {
            config.recording.output_directory = Some(output.clone());
        }
        if let Some(backend) = self.capture {
            config.capture.backend = backend;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging (file + stderr), falling back to stderr only
    let _log_guard = match logging::init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .with_writer(std::io::stderr)
                .init();
            warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    if let Some(path) = &args.inspect {
        return inspect::run(path);
    }

    info!("keylog Agent starting...");
    if let Ok(log_dir) = logging::log_dir() {
        info!("Logs written to {:?}", log_dir);
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Ok(path) = config.config_path() {
        info!("Configuration loaded from {:?}", path);
    }
    args.apply(&mut config);
    config.validate()?;

    let session_id = config.session_id();
    let session_dir = config.output_directory().join(format!(
        "session-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));
    let log_path = session_dir.join(&config.recording.file_name);
    info!("Session {} output: {:?}", session_id, session_dir);

    let runtime = tokio::runtime::Runtime::new()?;

    let frame_capture = runtime
        .block_on(capture::create_frame_capture(&config.capture, &session_dir))
        .context("Failed to set up frame capture")?;

    let mut engine = RecordingEngine::new(
        session_id,
        config.interval(),
        config.key_bindings(),
        log_path,
        create_input_backend(),
        Arc::from(frame_capture),
    );

    // Ctrl+C ends the session the same way the stop key does
    let ctrl_c_tx = engine.input_sender();
    let stop_key = config.key_bindings().stop_key;
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, stopping session...");
        let _ = ctrl_c_tx.send(KeyAction::Release(stop_key.clone()));
    })?;

    println!(
        "Recording every {} ms. Release {} to stop.",
        config.recording.interval_ms, config.input.stop_key
    );

    let outcome = engine.start(runtime.handle())?;
    match &outcome {
        SessionOutcome::Completed(saved) => {
            println!("Saved {} records to {}", saved.records, saved.path.display());
        }
        SessionOutcome::PersistenceFailed(e) => {
            error!("Session ended but the log was not saved: {}", e);
        }
    }

    info!("Shutdown complete");
    drop(_log_guard);
    std::process::exit(outcome.exit_code());
}

fn print_help() {
    println!("keylog Agent - keyboard state sampling paired with emulator frames");
    println!();
    println!("USAGE:");
    println!("    keylog-agent [OPTIONS]");
    println!("    keylog-agent inspect <LOG>");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help               Print this help message");
    println!("    -c, --config <PATH>      Use this config file");
    println!("    -i, --interval-ms <MS>   Sampling interval in milliseconds");
    println!("    -o, --output <DIR>       Directory for session output");
    println!("        --capture <BACKEND>  Frame capture: none, obs, command");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG          Set log level (e.g., debug, info, warn)");
    println!("    KEYLOG_LOG_PATH   Override the log directory");
}
