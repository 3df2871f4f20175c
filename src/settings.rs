//! Settings for the calibrator command line.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::calibration::{
    CalibrationConfig, DEFAULT_MAX_DURATION_MS, DEFAULT_MIN_DURATION_MS, DEFAULT_MIN_SAMPLES,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_Z_THRESHOLD,
};
use crate::correction::{LiveLoopConfig, DEFAULT_SETTLE_DELAY_MS, DEFAULT_TICK_INTERVAL_MS};

/// Latitude of the default surveyed reference point.
pub const DEFAULT_REFERENCE_LAT: f64 = 46.77950;

/// Longitude of the default surveyed reference point.
pub const DEFAULT_REFERENCE_LON: f64 = 6.65930;

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Latitude of the surveyed reference point (degrees)
    pub reference_lat: f64,
    /// Longitude of the surveyed reference point (degrees)
    pub reference_lon: f64,
    /// Minimum calibration window in milliseconds
    pub min_duration_ms: u64,
    /// Minimum accepted samples per calibration
    pub min_samples: usize,
    /// Delay after each calibration read in milliseconds
    pub sample_interval_ms: u64,
    /// Outlier z-score threshold
    pub z_threshold: f64,
    /// Hard bound on the calibration window in milliseconds
    pub max_duration_ms: u64,
    /// Live correction tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Settle delay before handing updates back, in milliseconds
    pub settle_delay_ms: u64,
    /// Recorded track to replay as the position source
    pub track_path: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            reference_lat: DEFAULT_REFERENCE_LAT,
            reference_lon: DEFAULT_REFERENCE_LON,
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            min_samples: DEFAULT_MIN_SAMPLES,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            z_threshold: DEFAULT_Z_THRESHOLD,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            track_path: String::new(),
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "gps-calibrator")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Get logs directory path.
    pub fn logs_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "gps-calibrator")
            .map(|dirs| dirs.data_dir().join("logs"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let loaded: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        loaded.backfilled()
    }

    /// Replace zeroed or invalid fields left by older config files.
    fn backfilled(mut self) -> Self {
        let defaults = Self::default();

        if self.min_duration_ms == 0 {
            self.min_duration_ms = defaults.min_duration_ms;
        }
        if self.sample_interval_ms == 0 {
            self.sample_interval_ms = defaults.sample_interval_ms;
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            self.z_threshold = defaults.z_threshold;
        }
        if self.max_duration_ms == 0 {
            self.max_duration_ms = defaults.max_duration_ms;
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = defaults.tick_interval_ms;
        }

        self
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::settings_path().ok_or("Cannot determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }

    /// Calibration configuration from these settings.
    pub fn calibration_config(&self) -> CalibrationConfig {
        CalibrationConfig::default()
            .with_min_duration(self.min_duration_ms)
            .with_min_samples(self.min_samples)
            .with_sample_interval(self.sample_interval_ms)
            .with_z_threshold(self.z_threshold)
            .with_max_duration(self.max_duration_ms)
    }

    /// Live loop configuration from these settings.
    pub fn live_loop_config(&self) -> LiveLoopConfig {
        LiveLoopConfig::default()
            .with_interval(self.tick_interval_ms)
            .with_settle_delay(self.settle_delay_ms)
    }
}
