//! Configuration file support for ninaflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (NINAFLASH_*)
//! 3. Local config file (./ninaflash.toml)
//! 4. Global config file (~/.config/ninaflash/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "ninaflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate of the command sketch.
    pub baud: Option<u32>,
    /// Read timeout for device commands, in milliseconds.
    pub read_timeout_ms: Option<u64>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Skip the MD5 check after a firmware upload.
    #[serde(default)]
    pub no_verify: bool,
    /// Reset the board at 1200 bps and watch for its new port.
    #[serde(default)]
    pub reset: bool,
}

/// Port watcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchSection {
    /// How long to wait for the board to reappear, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Pause between two port enumerations, in milliseconds.
    pub poll_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
    /// Port watcher configuration.
    #[serde(default)]
    pub watch: WatchSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ninaflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.connection.read_timeout_ms.is_some() {
            self.connection.read_timeout_ms = other.connection.read_timeout_ms;
        }

        if other.flash.no_verify {
            self.flash.no_verify = true;
        }
        if other.flash.reset {
            self.flash.reset = true;
        }

        if other.watch.timeout_ms.is_some() {
            self.watch.timeout_ms = other.watch.timeout_ms;
        }
        if other.watch.poll_ms.is_some() {
            self.watch.poll_ms = other.watch.poll_ms;
        }
    }

    /// Session read timeout, if configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.connection
            .read_timeout_ms
            .map(Duration::from_millis)
    }

    /// Watcher timing, starting from the library defaults.
    pub fn watch_config(&self) -> ninaflash::WatchConfig {
        let mut watch = ninaflash::WatchConfig::default();
        if let Some(ms) = self.watch.timeout_ms {
            watch = watch.with_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.watch.poll_ms {
            watch = watch.with_poll_interval(Duration::from_millis(ms));
        }
        watch
    }
}
