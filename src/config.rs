//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the led-config.toml file.
//! It provides a centralized way to configure the serial link, display timing, asset
//! locations, logging and the statically configured device list.
//!
//! Every section and every key is optional. Missing keys take their defaults, and a
//! missing or unreadable file falls back to [`Config::default`].

use crate::devices::DeviceEntry;
use crate::transport::LinkSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "led-config.toml";

/// Application configuration loaded from led-config.toml
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial link to the matrix
    pub serial: SerialConfig,
    /// Layout timing and pane selection
    pub display: DisplayConfig,
    /// Image locations
    pub assets: AssetConfig,
    /// Log filter
    pub logging: LoggingConfig,
    /// Devices answered by the built-in static device source
    pub devices: Vec<DeviceEntry>,
}

/// Serial port and handshake configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path
    pub port: PathBuf,
    /// Fallback data rate; the first attempt runs at twice this
    pub nominal_baud: u32,
    /// Program run before each open attempt to reset the matrix
    pub reset_command: PathBuf,
    /// Seconds a frame write may take before the link is declared dead
    pub watchdog_secs: u64,
}

/// Interactive layout configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Seconds without interaction before the layout sleeps
    pub idle_timeout_secs: u64,
    /// Gesture lockout after a toggle, in milliseconds
    pub debounce_ms: u64,
    /// Show the diagnostic status pane in place of the heater pane
    pub diagnostic_pane: bool,
    /// Start with interactive control enabled instead of the pairing view
    pub start_interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory holding the pane images
    pub image_dir: PathBuf,
    /// Directory scanned for pairing icons
    pub icon_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset, e.g. "info" or "led_matrix_lib=debug"
    pub level: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: PathBuf::from("/dev/tty.ledmatrix"),
            nominal_baud: 115_200,
            reset_command: PathBuf::from("/usr/local/bin/reset-led-matrix"),
            watchdog_secs: 10,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            idle_timeout_secs: 30,
            debounce_ms: 250,
            diagnostic_pane: false,
            start_interactive: false,
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            image_dir: PathBuf::from("images"),
            icon_dir: PathBuf::from("images"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl SerialConfig {
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            nominal_baud: self.nominal_baud,
            watchdog: self.watchdog(),
        }
    }
}

impl DisplayConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Where a loaded [`Config`] came from.
///
/// Loading happens before logging is set up, so the outcome is kept and reported
/// with [`ConfigOrigin::log`] once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid { path: PathBuf, reason: String },
}

impl ConfigOrigin {
    pub fn log(&self, config: &Config) {
        match self {
            ConfigOrigin::Loaded(path) => info!(
                "Loaded configuration from {} (port {})",
                path.display(),
                config.serial.port.display()
            ),
            ConfigOrigin::Missing(path) => {
                info!("No config file at {}, using default configuration", path.display())
            }
            ConfigOrigin::Invalid { path, reason } => {
                warn!("Invalid config file format in {}: {}", path.display(), reason);
                warn!("Using default configuration");
            }
        }
    }
}

impl Config {
    /// Load configuration from led-config.toml file
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let (config, origin) = Self::read_from_path(path);
        origin.log(&config);
        config
    }

    /// Like [`load_from_path`](Self::load_from_path), but hands the outcome back
    /// instead of logging it.
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> (Self, ConfigOrigin) {
        let path = path.as_ref().to_path_buf();
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => (config, ConfigOrigin::Loaded(path)),
                Err(e) => (
                    Self::default(),
                    ConfigOrigin::Invalid {
                        path,
                        reason: e.to_string(),
                    },
                ),
            },
            Err(_) => (Self::default(), ConfigOrigin::Missing(path)),
        }
    }

    /// Whether the status pane replaces the heater pane.
    ///
    /// A non-empty `CERTIFICATION` environment variable forces it on.
    pub fn diagnostic_pane(&self) -> bool {
        self.display.diagnostic_pane || certification_requested(std::env::var("CERTIFICATION").ok())
    }
}

fn certification_requested(value: Option<String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.port, PathBuf::from("/dev/tty.ledmatrix"));
        assert_eq!(config.serial.nominal_baud, 115_200);
        assert_eq!(config.serial.watchdog(), Duration::from_secs(10));
        assert_eq!(config.display.debounce(), Duration::from_millis(250));
        assert_eq!(config.display.idle_timeout(), Duration::from_secs(30));
        assert!(!config.display.start_interactive);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.devices.push(DeviceEntry {
            id: "lounge-light".to_string(),
            thing_type: "light".to_string(),
            protocols: vec!["on-off".to_string(), "brightness".to_string()],
        });
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[serial]
watchdog_secs = 3

[display]
start_interactive = true

[[devices]]
id = "porch-heater"
thing_type = "heater"
protocols = ["on-off"]
"#
        )
        .unwrap();

        let config = Config::load_from_path(file.path());
        assert_eq!(config.serial.watchdog(), Duration::from_secs(3));
        assert_eq!(config.serial.nominal_baud, 115_200);
        assert!(config.display.start_interactive);
        assert_eq!(config.display.debounce_ms, 250);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].thing_type, "heater");
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "serial = 12").unwrap();
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_read_reports_origin() {
        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "serial = 12").unwrap();
        let (config, origin) = Config::read_from_path(bad.path());
        assert_eq!(config, Config::default());
        match origin {
            ConfigOrigin::Invalid { path, reason } => {
                assert_eq!(path, bad.path());
                assert!(!reason.is_empty());
            }
            other => panic!("expected an invalid origin, got {:?}", other),
        }

        let mut good = NamedTempFile::new().unwrap();
        writeln!(good, "[serial]\nwatchdog_secs = 4").unwrap();
        let (config, origin) = Config::read_from_path(good.path());
        assert_eq!(config.serial.watchdog(), Duration::from_secs(4));
        assert_eq!(origin, ConfigOrigin::Loaded(good.path().to_path_buf()));

        let (_, origin) = Config::read_from_path("/nonexistent/path");
        assert_eq!(origin, ConfigOrigin::Missing(PathBuf::from("/nonexistent/path")));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_certification_switch() {
        assert!(certification_requested(Some("1".to_string())));
        assert!(!certification_requested(Some(String::new())));
        assert!(!certification_requested(None));
    }
}
