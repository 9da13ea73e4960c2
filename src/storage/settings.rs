//! Settings file persistence.
//!
//! Handles saving and loading the tuner settings to/from disk. Missing
//! fields take their defaults, so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{
    BASELINE_FAN_SPEED, DEFAULT_FAN_SPEED_UPDATE_PERIOD, DEFAULT_INTEGRAL_GAIN,
    DEFAULT_PROPORTIONAL_GAIN, DEFAULT_TEMPERATURE_HYSTERESIS, MAX_FAN_SPEED,
};
use crate::error::{Result, TunerError};

// =============================================================================
// Config Path
// =============================================================================

const APP_NAME: &str = "nvidia-tuner";
const CONFIG_FILE: &str = "config.json";

/// Get the configuration directory path, e.g. `~/.config/nvidia-tuner/`.
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or_else(|| TunerError::Storage("Could not find config directory".into()))
}

/// Get the full path to the settings file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

// =============================================================================
// Storage Structures
// =============================================================================

/// Settings as stored on disk. Not validated; see
/// [`TunerSettings`](crate::config::TunerSettings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default)]
    pub gpu_index: u32,

    /// MHz
    #[serde(default)]
    pub core_clock_offset: Option<i32>,

    /// MHz
    #[serde(default)]
    pub memory_clock_offset: Option<i32>,

    #[serde(default)]
    pub max_core_clock: Option<u32>,

    #[serde(default)]
    pub max_memory_clock: Option<u32>,

    /// Watts
    #[serde(default)]
    pub power_limit: Option<u32>,

    /// Selects PI mode
    #[serde(default)]
    pub target_temperature: Option<f32>,

    /// Selects curve mode, `"t1:f1,t2:f2,..."`
    #[serde(default)]
    pub pairs: Option<String>,

    /// Seconds
    #[serde(default = "default_update_period")]
    pub fan_speed_update_period: u32,

    /// °C
    #[serde(default = "default_hysteresis")]
    pub temperature_hysteresis: u32,

    #[serde(default = "default_proportional_gain")]
    pub proportional_gain: f32,

    #[serde(default = "default_integral_gain")]
    pub integral_gain: f32,

    #[serde(default = "default_min_fan_speed")]
    pub min_fan_speed: u32,

    #[serde(default = "default_max_fan_speed")]
    pub max_fan_speed: u32,
}

fn default_update_period() -> u32 {
    DEFAULT_FAN_SPEED_UPDATE_PERIOD
}

fn default_hysteresis() -> u32 {
    DEFAULT_TEMPERATURE_HYSTERESIS
}

fn default_proportional_gain() -> f32 {
    DEFAULT_PROPORTIONAL_GAIN
}

fn default_integral_gain() -> f32 {
    DEFAULT_INTEGRAL_GAIN
}

fn default_min_fan_speed() -> u32 {
    BASELINE_FAN_SPEED
}

fn default_max_fan_speed() -> u32 {
    MAX_FAN_SPEED
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            gpu_index: 0,
            core_clock_offset: None,
            memory_clock_offset: None,
            max_core_clock: None,
            max_memory_clock: None,
            power_limit: None,
            target_temperature: None,
            pairs: None,
            fan_speed_update_period: default_update_period(),
            temperature_hysteresis: default_hysteresis(),
            proportional_gain: default_proportional_gain(),
            integral_gain: default_integral_gain(),
            min_fan_speed: default_min_fan_speed(),
            max_fan_speed: default_max_fan_speed(),
        }
    }
}

// =============================================================================
// Storage Functions
// =============================================================================

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<StoredSettings> {
    if !path.exists() {
        debug!("No settings file at {}, using defaults", path.display());
        return Ok(StoredSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| TunerError::Storage(format!("Failed to read settings: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| TunerError::Storage(format!("Failed to parse settings: {}", e)))
}

/// Save settings to `path`, creating the parent directory if needed.
pub fn save_settings(path: &Path, settings: &StoredSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| TunerError::Storage(format!("Failed to create config dir: {}", e)))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| TunerError::Storage(format!("Failed to serialize settings: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| TunerError::Storage(format!("Failed to write settings: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, StoredSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "gpu_index": 1, "pairs": "40:30,80:100" }"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.gpu_index, 1);
        assert_eq!(settings.pairs.as_deref(), Some("40:30,80:100"));
        assert_eq!(settings.temperature_hysteresis, DEFAULT_TEMPERATURE_HYSTERESIS);
        assert_eq!(settings.min_fan_speed, BASELINE_FAN_SPEED);
        assert_eq!(settings.proportional_gain, DEFAULT_PROPORTIONAL_GAIN);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = StoredSettings {
            target_temperature: Some(65.0),
            power_limit: Some(250),
            core_clock_offset: Some(-100),
            ..StoredSettings::default()
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_settings(&path), Err(TunerError::Storage(_))));
    }
}
