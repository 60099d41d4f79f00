// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::calibration::CalibrationConfig;
use crate::connectivity::{ConnectivityConfig, DeviceConfig};
use crate::telemetry::DEFAULT_CAPACITY;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Device used until the settings store has one
    pub device: DeviceConfig,

    /// Probe, polling and upgrade policy
    pub connectivity: ConnectivityConfig,

    /// Sample window
    pub buffer: BufferConfig,

    /// Calibration schedule
    pub calibration: CalibrationConfig,

    /// Alerting
    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "WiCare".to_string(),
            log_level: "info".to_string(),
            device: DeviceConfig::default(),
            connectivity: ConnectivityConfig::default(),
            buffer: BufferConfig::default(),
            calibration: CalibrationConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {:?}", path))?;
        config.device.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("wicare"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Where the last applied device settings are kept
    pub fn device_settings_path() -> PathBuf {
        Self::config_dir().join("device.toml")
    }
}

/// Sample window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Samples kept for the live waveform
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Number the escalation hook calls
    pub emergency_number: String,

    /// Expose manual Safe/Fall overrides
    pub debug_controls: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            emergency_number: "119".to_string(),
            debug_controls: false,
        }
    }
}

/// Persistence for the device settings.
///
/// Loading never fails; a missing or broken record yields the fallback config.
pub trait SettingsStore: Send + Sync {
    fn load_device_config(&self) -> DeviceConfig;

    fn save_device_config(&self, config: &DeviceConfig) -> Result<()>;
}

/// Keeps the device settings in a TOML file
pub struct TomlSettingsStore {
    path: PathBuf,
    fallback: DeviceConfig,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fallback(path, DeviceConfig::default())
    }

    pub fn with_fallback(path: impl Into<PathBuf>, fallback: DeviceConfig) -> Self {
        Self {
            path: path.into(),
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<DeviceConfig> {
        let content = std::fs::read_to_string(&self.path)?;
        let config: DeviceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load_device_config(&self) -> DeviceConfig {
        if !self.path.exists() {
            return self.fallback.clone();
        }

        match self.read() {
            Ok(config) => {
                info!("Restored device settings {} from {:?}", config, self.path);
                config
            }
            Err(e) => {
                warn!("Ignoring device settings in {:?}: {}", self.path, e);
                self.fallback.clone()
            }
        }
    }

    fn save_device_config(&self, config: &DeviceConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing {:?}", self.path))?;
        Ok(())
    }
}

/// In-process store, for tests and embedders without a filesystem
#[derive(Default)]
pub struct MemorySettingsStore {
    config: RwLock<Option<DeviceConfig>>,
}

impl MemorySettingsStore {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config: RwLock::new(Some(config)),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_device_config(&self) -> DeviceConfig {
        self.config.read().clone().unwrap_or_default()
    }

    fn save_device_config(&self, config: &DeviceConfig) -> Result<()> {
        *self.config.write() = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{TransportMode, UpgradePolicy};
    use tempfile::tempdir;

    #[test]
    fn test_config_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.alerts.emergency_number, "119");

        config.device = DeviceConfig::validated("192.168.1.50", 9000, TransportMode::Streaming).unwrap();
        config.connectivity.upgrade_policy = UpgradePolicy::Periodic { interval_ms: 30_000 };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device, config.device);
        assert_eq!(loaded.connectivity.upgrade_policy, config.connectivity.upgrade_policy);
        assert_eq!(loaded.buffer.capacity, 100);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.device, DeviceConfig::default());
        assert_eq!(config.calibration.steps, 10);
    }

    #[test]
    fn test_toml_store_falls_back_on_bad_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.toml");
        let store = TomlSettingsStore::new(&path);

        assert_eq!(store.load_device_config(), DeviceConfig::default());

        std::fs::write(&path, "host = \"\"\nport = 8080\ntransport_mode = \"polling\"\n").unwrap();
        assert_eq!(store.load_device_config(), DeviceConfig::default());

        std::fs::write(&path, "not toml at all [").unwrap();
        assert_eq!(store.load_device_config(), DeviceConfig::default());
    }

    #[test]
    fn test_toml_store_persists() {
        let dir = tempdir().unwrap();
        let store = TomlSettingsStore::new(dir.path().join("device.toml"));
        let config = DeviceConfig::validated("10.0.0.7", 8081, TransportMode::Streaming).unwrap();

        store.save_device_config(&config).unwrap();
        assert_eq!(store.load_device_config(), config);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        assert_eq!(store.load_device_config(), DeviceConfig::default());

        let config = DeviceConfig::validated("wicare.local", 80, TransportMode::Polling).unwrap();
        store.save_device_config(&config).unwrap();
        assert_eq!(store.load_device_config(), config);
    }
}
