//! Transfer settings with JSON persistence.
//!
//! `TransferSettings` carries the knobs an object transfer reads at start:
//! packet size, PRN cadence and the control point response timing. The
//! defaults match the Secure DFU bootloader over a default-MTU BLE link.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dfu::config::{
    DEFAULT_MTU_SIZE, DEFAULT_PRN, NOTIFICATION_POLL_INTERVAL, NOTIFICATION_TIMEOUT,
};
use crate::dfu::{DfuError, DfuResult};

/// Settings applied to each object transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferSettings {
    /// Maximum packet payload in bytes.
    #[serde(default = "default_mtu_size")]
    pub mtu_size: usize,

    /// Packets between checksum validations. 0 disables validation.
    #[serde(default = "default_prn")]
    pub prn: u16,

    /// Ceiling for a single control point response.
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,

    /// Interval between notification buffer scans.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_mtu_size() -> usize {
    DEFAULT_MTU_SIZE
}

fn default_prn() -> u16 {
    DEFAULT_PRN
}

fn default_notification_timeout_ms() -> u64 {
    NOTIFICATION_TIMEOUT.as_millis() as u64
}

fn default_poll_interval_ms() -> u64 {
    NOTIFICATION_POLL_INTERVAL.as_millis() as u64
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            mtu_size: default_mtu_size(),
            prn: default_prn(),
            notification_timeout_ms: default_notification_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransferSettings {
    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject values a transfer cannot run with.
    pub fn validate(&self) -> DfuResult<()> {
        if self.mtu_size == 0 {
            return Err(DfuError::InvalidConfig {
                reason: "mtuSize must be at least 1".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(DfuError::InvalidConfig {
                reason: "pollIntervalMs must be at least 1".into(),
            });
        }
        if self.notification_timeout_ms < self.poll_interval_ms {
            return Err(DfuError::InvalidConfig {
                reason: format!(
                    "notificationTimeoutMs ({}) is shorter than pollIntervalMs ({})",
                    self.notification_timeout_ms, self.poll_interval_ms
                ),
            });
        }
        Ok(())
    }
}

/// Settings file name stored in the settings directory.
const SETTINGS_FILENAME: &str = "transfer_settings.json";

/// Manages persistence of transfer settings to a JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given directory.
    pub fn new(settings_dir: &Path) -> Self {
        let settings_file_path = settings_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if the file doesn't exist.
    pub fn load(&self) -> DfuResult<TransferSettings> {
        if !self.settings_file_path.exists() {
            return Ok(TransferSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(TransferSettings::default());
        }

        let settings: TransferSettings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &TransferSettings) -> DfuResult<()> {
        settings.validate()?;

        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(settings)?;
        fs::write(&self.settings_file_path, contents)?;

        Ok(())
    }
}
