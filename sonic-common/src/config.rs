//! Configuration loading and config file resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (applied by the binary on top of the loaded file)
//! 2. `SONIC_CONFIG` environment variable (config file location)
//! 3. User config file (`~/.config/sonicscribe/config.toml` on Linux)
//! 4. System config file (`/etc/sonicscribe/config.toml`)
//! 5. Built-in defaults
//!
//! A missing config file is not an error: a warning is logged and defaults
//! are used. A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SONIC_CONFIG";

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub intake: IntakeConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// Sessions without requests for this long are closed; 0 keeps them
    pub session_idle_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
            max_upload_bytes: 64 * 1024 * 1024,
            session_idle_seconds: 3600,
        }
    }
}

/// Built-in transcription engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Analysis sample rate; input audio is resampled to it
    pub sample_rate: u32,
    /// Analysis window length in samples
    pub frame_size: usize,
    /// Distance between analysis windows in samples
    pub hop_size: usize,
    /// YIN aperiodicity threshold (lower is stricter)
    pub yin_threshold: f32,
    /// Frames quieter than this RMS are unvoiced
    pub min_rms: f32,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// Notes shorter than this are dropped
    pub min_note_seconds: f64,
    /// Force one transcription at a time even if the engine allows more
    pub serialize_calls: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 1024,
            hop_size: 256,
            yin_threshold: 0.15,
            min_rms: 0.01,
            min_frequency_hz: 55.0,
            max_frequency_hz: 1760.0,
            min_note_seconds: 0.06,
            serialize_calls: false,
        }
    }
}

/// Filename-based producer selection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionRule {
    /// Token right after the first `.` (`"a.mid.bak"` counts as MIDI)
    #[default]
    FirstToken,
    /// Text after the last `.` (`"a.mid.bak"` counts as audio)
    Trailing,
}

/// File intake settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub extension_rule: ExtensionRule,
    /// Longest note sequence a producer may yield, in seconds
    pub max_duration_seconds: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            extension_rule: ExtensionRule::default(),
            max_duration_seconds: 3600.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl TomlConfig {
    /// Reject settings the engine or server cannot run with
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        if m.sample_rate == 0 {
            return Err(Error::Config("model.sample_rate must be positive".to_string()));
        }
        if m.hop_size == 0 || m.frame_size < 2 * m.hop_size {
            return Err(Error::Config(format!(
                "model.frame_size ({}) must be at least twice model.hop_size ({})",
                m.frame_size, m.hop_size
            )));
        }
        if !(m.min_frequency_hz > 0.0 && m.min_frequency_hz < m.max_frequency_hz) {
            return Err(Error::Config(format!(
                "model frequency range {}..{} Hz is empty",
                m.min_frequency_hz, m.max_frequency_hz
            )));
        }
        if m.max_frequency_hz * 2.0 > m.sample_rate as f32 {
            return Err(Error::Config(format!(
                "model.max_frequency_hz ({}) exceeds Nyquist for {} Hz",
                m.max_frequency_hz, m.sample_rate
            )));
        }
        // Longest period must fit twice in one window for YIN
        let longest_period = m.sample_rate as f32 / m.min_frequency_hz;
        if longest_period * 2.0 > m.frame_size as f32 {
            return Err(Error::Config(format!(
                "model.frame_size ({}) too short for {} Hz at {} Hz sample rate",
                m.frame_size, m.min_frequency_hz, m.sample_rate
            )));
        }
        let max_duration = self.intake.max_duration_seconds;
        if !(max_duration.is_finite() && max_duration > 0.0) {
            return Err(Error::Config(format!(
                "intake.max_duration_seconds ({}) must be a positive number",
                max_duration
            )));
        }
        if self.events.capacity == 0 {
            return Err(Error::Config("events.capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Locate the config file to load
///
/// Returns `None` when no candidate exists; callers fall back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("sonicscribe").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/sonicscribe/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load and validate the TOML config at `path`
///
/// A missing file yields defaults with a warning.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(TomlConfig::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve and load configuration; defaults when no file is found
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => load_toml_config(&path),
        None => {
            info!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        TomlConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [intake]
            extension_rule = "trailing"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.intake.extension_rule, ExtensionRule::Trailing);
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_validate_rejects_short_frame() {
        let mut config = TomlConfig::default();
        config.model.frame_size = 256;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_duration() {
        let mut config = TomlConfig::default();
        config.intake.max_duration_seconds = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.intake.max_duration_seconds = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_frequency_above_nyquist() {
        let mut config = TomlConfig::default();
        config.model.max_frequency_hz = 9000.0;
        assert!(config.validate().is_err());
    }
}
