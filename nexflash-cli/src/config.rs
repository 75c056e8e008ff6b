//! Configuration file support for nexflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (NEXFLASH_*)
//! 3. Local config file (./nexflash.toml)
//! 4. Global config file (~/.config/nexflash/config.toml)
//!
//! ```toml
//! [connection]
//! serial = "/dev/ttyUSB0"
//! baud = 9600
//!
//! [upload]
//! baud = 921600
//! retries = 3
//! timeout_ms = 2000
//! legacy = false
//!
//! [[usb_device]]
//! vid = 6790
//! pid = 29987
//! ```

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
const LOCAL_CONFIG: &str = "nexflash.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate the display listens on when idle.
    pub baud: Option<u32>,
}

/// Upload session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Transfer baud rate.
    pub baud: Option<u32>,
    /// Extra attempts for an unacknowledged section.
    pub retries: Option<u32>,
    /// Response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Use the legacy `whmi-wri` update command.
    pub legacy: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Upload settings.
    #[serde(default)]
    pub upload: UploadSettings,
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
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
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
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
        ProjectDirs::from("", "", "nexflash").map(|dirs| dirs.config_dir().to_path_buf())
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

        if other.upload.baud.is_some() {
            self.upload.baud = other.upload.baud;
        }
        if other.upload.retries.is_some() {
            self.upload.retries = other.upload.retries;
        }
        if other.upload.timeout_ms.is_some() {
            self.upload.timeout_ms = other.upload.timeout_ms;
        }
        if other.upload.legacy.is_some() {
            self.upload.legacy = other.upload.legacy;
        }

        for device in other.usb_device {
            if !self.usb_device.contains(&device) {
                self.usb_device.push(device);
            }
        }
    }

    /// Whether a USB device was remembered earlier.
    pub fn knows_usb_device(&self, vid: u16, pid: u16) -> bool {
        self.usb_device
            .iter()
            .any(|d| d.matches(vid, pid))
    }

    /// Save USB device for future auto-detection.
    ///
    /// Written to the local config file when one exists, otherwise to the
    /// global one.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        if self.knows_usb_device(vid, pid) {
            return Ok(());
        }

        let path = if Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_CONFIG)
        } else if let Some(global_path) = Self::global_config_path() {
            if let Some(dir) = global_path.parent() {
                fs::create_dir_all(dir)?;
            }
            global_path
        } else {
            PathBuf::from(LOCAL_CONFIG)
        };

        self.usb_device.push(UsbDevice { vid, pid });
        Self::append_usb_device(&path, UsbDevice { vid, pid })?;
        info!("Saved USB device to {}", path.display());

        Ok(())
    }

    /// Add a device to the file at `path`, keeping its other settings.
    fn append_usb_device(path: &Path, device: UsbDevice) -> anyhow::Result<()> {
        let mut stored = if path.exists() {
            toml::from_str::<Self>(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        if !stored.usb_device.contains(&device) {
            stored.usb_device.push(device);
        }
        fs::write(path, toml::to_string_pretty(&stored)?)?;
        Ok(())
    }
}
