use crate::domain::models::{AdvertiseMode, TxPower};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            // Broadcasts arrive on platform threads, so thread ids are useful
            show_thread_ids: default_true(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisingSettings {
    #[serde(default = "default_mode")]
    pub mode: AdvertiseMode,
    #[serde(default = "default_tx_power")]
    pub tx_power: TxPower,
    #[serde(default = "default_true")]
    pub connectable: bool,
    #[serde(default = "default_false")]
    pub include_device_name: bool,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
}

impl Default for AdvertisingSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            tx_power: default_tx_power(),
            connectable: default_true(),
            include_device_name: default_false(),
            service_uuid: default_service_uuid(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bluetooth_coordinator".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_mode() -> AdvertiseMode {
    AdvertiseMode::Balanced
}
fn default_tx_power() -> TxPower {
    TxPower::Medium
}
fn default_service_uuid() -> String {
    "123e4567-e89b-12d3-a456-426614174000".to_string()
}
fn default_discoverable_duration_secs() -> u32 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub advertising: AdvertisingSettings,

    /// Length of the window requested by `make_discoverable`
    #[serde(default = "default_discoverable_duration_secs")]
    pub discoverable_duration_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            advertising: AdvertisingSettings::default(),
            discoverable_duration_secs: default_discoverable_duration_secs(),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults if it is missing
    /// or unreadable.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BluetoothCoordinator");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
