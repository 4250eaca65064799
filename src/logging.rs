//! Process-wide tracing setup: daily rolling file plus stderr

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Rolling file prefix; the appender adds a date suffix
const LOG_FILE_PREFIX: &str = "keylog.log";
const LOG_DIR_ENV: &str = "KEYLOG_LOG_PATH";
const RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Where session logs go: `KEYLOG_LOG_PATH`, else a `logs` dir under the
/// platform state (Linux) or local data dir.
pub fn log_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let dirs = ProjectDirs::from("dev", "keylog", "agent")
        .context("No home directory to place logs under")?;
    let base = if cfg!(target_os = "linux") {
        dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir())
    } else {
        dirs.data_local_dir()
    };
    Ok(base.join("logs"))
}

/// Install the global subscriber. The returned guard flushes the file
/// writer when dropped, so hold it until exit.
pub fn init_logging() -> Result<WorkerGuard> {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
    prune_old_logs(&dir, RETENTION);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    // Console.app picks these up under the agent's subsystem
    #[cfg(target_os = "macos")]
    let registry = registry.with(tracing_oslog::OsLogger::new("dev.keylog.agent", "default"));

    registry.init();
    Ok(guard)
}

/// Delete our rolled log files last modified more than `max_age` ago.
/// Anything else in the directory is left alone.
fn prune_old_logs(dir: &Path, max_age: Duration) {
    let (Ok(entries), Some(cutoff)) = (std::fs::read_dir(dir), SystemTime::now().checked_sub(max_age))
    else {
        return;
    };

    let stale = entries.flatten().filter(|entry| {
        let ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        let modified = entry
            .metadata()
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok());
        ours && modified.is_some_and(|m| m < cutoff)
    });

    for entry in stale {
        let _ = std::fs::remove_file(entry.path());
    }
}
