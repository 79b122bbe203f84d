//! Persisted settings
//!
//! Settings seed the sampler and the logger at startup. Once the service is
//! running, the control surface is the only way to change sampler parameters.
//!
//! - `loader`: file location and JSON (de)serialization
//! - `SettingsManager`: lenient load with fallback to defaults, and save

pub mod loader;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::models::MAX_PERIOD_MS;
use crate::sampler::histogram::{EdgePolicy, HistogramConfig};
use crate::sampler::tuner::RealtimeSettings;

/// Everything read from `settings.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Sampler
    pub period_ms: u32,
    pub bin_count: u16,
    pub bin_width_ns: u64,
    pub edge_policy: EdgePolicy,

    // Logging
    pub log_dir: String,
    pub log_level: String,
    pub echo_logs: bool,

    pub realtime: RealtimeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let histogram = HistogramConfig::default();
        Settings {
            period_ms: 10,
            bin_count: histogram.bin_count,
            bin_width_ns: histogram.bin_width_ns,
            edge_policy: histogram.edge_policy,
            log_dir: "logs".to_string(),
            log_level: "info".to_string(),
            echo_logs: true,
            realtime: RealtimeSettings::default(),
        }
    }
}

impl Settings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms as u64)
    }

    pub fn histogram_config(&self) -> HistogramConfig {
        HistogramConfig::new(self.bin_count, self.bin_width_ns).with_edge_policy(self.edge_policy)
    }

    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }

    /// Reject values the sampler or logger would refuse
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.period_ms == 0 || self.period_ms > MAX_PERIOD_MS {
            return Err(SettingsError::ValidationFailed(format!(
                "period_ms {} outside 1..={}",
                self.period_ms, MAX_PERIOD_MS
            )));
        }
        self.histogram_config()
            .validate()
            .map_err(|e| SettingsError::ValidationFailed(e.to_string()))?;
        if self.level_filter().is_none() {
            return Err(SettingsError::ValidationFailed(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        if self.log_dir.trim().is_empty() {
            return Err(SettingsError::ValidationFailed("log_dir cannot be empty".to_string()));
        }
        self.realtime.validate().map_err(SettingsError::ValidationFailed)?;
        Ok(())
    }
}

/// Loads and stores [`Settings`]
pub struct SettingsManager;

impl SettingsManager {
    /// Load from the default location
    pub fn load() -> Result<Settings, SettingsError> {
        let path = loader::default_settings_path()?;
        Self::load_from(&path)
    }

    /// Load settings from `path`, or return defaults if the file doesn't exist.
    ///
    /// A file that fails to parse is reported and replaced by defaults. Parsed
    /// settings must pass [`Settings::validate`].
    pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
        let settings = match loader::load_settings_from_file(path) {
            Ok(settings) => settings,
            Err(SettingsError::FileNotFound(_)) => return Ok(Settings::default()),
            Err(SettingsError::InvalidJson(e)) => {
                // Logger is not installed yet
                eprintln!(
                    "[Config] [WARNING] Failed to parse {}, falling back to defaults: {}",
                    path.display(),
                    e
                );
                return Ok(Settings::default());
            }
            Err(e) => return Err(e),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        loader::save_settings_to_file(settings, path)
    }
}
