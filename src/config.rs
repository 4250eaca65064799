//! Configuration management for keylog Agent

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::data::RawKey;
use crate::input::KeyBindings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Recording configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Input capture configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Frame capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Sampling interval (ms). Fixed for the whole session.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Directory that receives one sub-directory per session
    #[serde(default = "default_output_directory_option")]
    pub output_directory: Option<PathBuf>,

    /// File name of the persisted log inside the session directory
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Session ID (auto-generated if not set)
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Key whose release ends the session
    #[serde(default = "default_stop_key")]
    pub stop_key: String,

    /// Keys that are never resolved or recorded (e.g. the emulator's screenshot hotkey)
    #[serde(default = "default_reserved_keys")]
    pub reserved_keys: Vec<String>,
}

/// Which frame capture collaborator to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Record key state only
    #[default]
    None,
    /// Screenshot the OBS program scene over obs-websocket
    Obs,
    /// Run an external command per frame
    Command,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub backend: CaptureBackend,

    #[serde(default)]
    pub obs: ObsCaptureConfig,

    #[serde(default)]
    pub command: CommandCaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsCaptureConfig {
    #[serde(default = "default_obs_host")]
    pub host: String,

    #[serde(default = "default_obs_port")]
    pub port: u16,

    pub password: Option<String>,

    /// Screenshot width (None = source resolution)
    pub width: Option<u32>,

    /// Screenshot height (None = source resolution)
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandCaptureConfig {
    /// Program to run once per frame
    #[serde(default)]
    pub program: String,

    /// Arguments; `{frame}` is replaced with the frame number
    #[serde(default)]
    pub args: Vec<String>,
}

// Default value functions
fn default_interval_ms() -> u64 {
    300
}

fn default_output_directory() -> PathBuf {
    std::env::temp_dir().join("keylog-recordings")
}

fn default_output_directory_option() -> Option<PathBuf> {
    Some(default_output_directory())
}

fn default_file_name() -> String {
    "log.json".to_string()
}

fn default_stop_key() -> String {
    "esc".to_string()
}

fn default_reserved_keys() -> Vec<String> {
    vec!["f9".to_string()]
}

fn default_obs_host() -> String {
    "localhost".to_string()
}

fn default_obs_port() -> u16 {
    4455
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            output_directory: default_output_directory_option(),
            file_name: default_file_name(),
            session_id: None,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            stop_key: default_stop_key(),
            reserved_keys: default_reserved_keys(),
        }
    }
}

impl Default for ObsCaptureConfig {
    fn default() -> Self {
        Self {
            host: default_obs_host(),
            port: default_obs_port(),
            password: None,
            width: None,
            height: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        config.config_path = Some(config_path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "keylog", "agent")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Get or generate session ID
    pub fn session_id(&self) -> String {
        self.recording
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Sampling interval
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.recording.interval_ms)
    }

    /// Root directory for session output
    pub fn output_directory(&self) -> PathBuf {
        self.recording
            .output_directory
            .clone()
            .unwrap_or_else(default_output_directory)
    }

    /// Stop and reserved keys as the listener sees them
    pub fn key_bindings(&self) -> KeyBindings {
        KeyBindings {
            stop_key: RawKey::parse(&self.input.stop_key),
            reserved: self
                .input
                .reserved_keys
                .iter()
                .map(|k| RawKey::parse(k))
                .collect(),
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recording.interval_ms == 0 {
            bail!("recording.interval_ms must be greater than zero");
        }
        if self.recording.file_name.trim().is_empty() {
            bail!("recording.file_name must not be empty");
        }

        let bindings = self.key_bindings();
        if let Some(key) = bindings.stop_key.resolve() {
            bail!(
                "input.stop_key {:?} is the recorded key `{}`",
                self.input.stop_key,
                key
            );
        }
        for (entry, raw) in self.input.reserved_keys.iter().zip(&bindings.reserved) {
            if let Some(key) = raw.resolve() {
                bail!("input.reserved_keys entry {:?} is the recorded key `{}`", entry, key);
            }
            if raw.matches(&bindings.stop_key) {
                bail!("input.reserved_keys entry {:?} is also the stop key", entry);
            }
        }
        Ok(())
    }
}
