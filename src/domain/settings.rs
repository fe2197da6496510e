use crate::domain::protocol;
use crate::domain::registry::{DiscoveryFilter, TARGET_DEVICE_NAME};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
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
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
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
    "heartrate_sense".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Advertised name the scan admits into the device list
    #[serde(default = "default_target_name")]
    pub target_name: String,

    // BLE Settings
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,

    /// Connect to the first matching peripheral without waiting for a pick
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_name: default_target_name(),
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            auto_connect: default_true(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_target_name() -> String {
    TARGET_DEVICE_NAME.to_string()
}
fn default_service_uuid() -> String {
    protocol::SERVICE_UUID.to_string()
}
fn default_characteristic_uuid() -> String {
    protocol::HEART_RATE_CHAR_UUID.to_string()
}

impl Settings {
    /// Resolve the parts of the settings the monitor needs
    pub fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        Ok(MonitorConfig {
            filter: DiscoveryFilter::new(self.target_name.clone()),
            service_uuid: protocol::parse_uuid(&self.service_uuid)?,
            characteristic_uuid: protocol::parse_uuid(&self.characteristic_uuid)?,
        })
    }
}

/// What the monitor scans for and subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub filter: DiscoveryFilter,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            filter: DiscoveryFilter::default(),
            service_uuid: protocol::HEART_RATE_SERVICE,
            characteristic_uuid: protocol::HEART_RATE_CHARACTERISTIC,
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_path(Self::get_settings_path()?))
    }

    /// Load from an explicit path, falling back to defaults if it is missing or
    /// unreadable. A missing file is created with the defaults so it can be edited.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let exists = settings_path.exists();
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        let service = Self {
            settings,
            settings_path,
        };

        if !exists {
            if let Err(e) = service.save() {
                warn!("Could not write default settings: {}", e);
            }
        }
        service
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("HeartRateSense");
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
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_to_fixed_uuids() {
        let config = Settings::default().monitor_config().unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.filter.target_name(), "HeartRate-Sense");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "auto_connect": false, "log_settings": { "level": "debug" } }"#)
                .unwrap();
        assert!(!settings.auto_connect);
        assert_eq!(settings.target_name, TARGET_DEVICE_NAME);
        assert_eq!(settings.log_settings.level, "debug");
        assert_eq!(settings.log_settings.rotation, "daily");
    }

    #[test]
    fn test_invalid_uuid_is_rejected() {
        let settings = Settings {
            service_uuid: "not-a-uuid".to_string(),
            ..Settings::default()
        };
        assert!(settings.monitor_config().is_err());
    }

    fn temp_settings(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "heartrate_sense_{}_{}.json",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let path = temp_settings("fresh");
        let _ = fs::remove_file(&path);

        let service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().target_name, TARGET_DEVICE_NAME);
        assert!(path.exists());

        let written: Settings = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.service_uuid, protocol::SERVICE_UUID);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_existing_file_is_loaded() {
        let path = temp_settings("edited");
        fs::write(&path, r#"{ "target_name": "Bench-Sensor" }"#).unwrap();

        let service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().target_name, "Bench-Sensor");
        assert_eq!(service.path(), path.as_path());
        // user edits are not overwritten
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{ "target_name": "Bench-Sensor" }"#
        );
        let _ = fs::remove_file(path);
    }
}
