//! Tuning limits, validators and the resolved run configuration.
//!
//! Every user-facing value goes through one of the `validate_*` functions
//! below, whether it comes from the command line or the settings file.

use crate::cooling::{ControllerConfig, FanCurve};
use crate::error::ConfigError;
use crate::storage::StoredSettings;

// =============================================================================
// Limits
// =============================================================================

/// Oldest supported driver branch.
pub const MAJOR_MIN_VERSION: u32 = 520;

/// Fan speed scale (%).
pub const MAX_FAN_SPEED: u32 = 100;
/// Temperature scale (°C).
pub const MAX_TEMPERATURE: u32 = 100;

pub const DEFAULT_PROPORTIONAL_GAIN: f32 = 1.5;
pub const MIN_PROPORTIONAL_GAIN: f32 = 0.1;
pub const MAX_PROPORTIONAL_GAIN: f32 = 10.0;

pub const DEFAULT_INTEGRAL_GAIN: f32 = 0.05;
pub const MIN_INTEGRAL_GAIN: f32 = 0.01;
pub const MAX_INTEGRAL_GAIN: f32 = 1.0;

/// Seconds between two fan speed updates.
pub const DEFAULT_FAN_SPEED_UPDATE_PERIOD: u32 = 2;
pub const MIN_FAN_SPEED_UPDATE_PERIOD: u32 = 1;
pub const MAX_FAN_SPEED_UPDATE_PERIOD: u32 = 10;

pub const MIN_TARGET_TEMPERATURE: f32 = 30.0;
pub const MAX_TARGET_TEMPERATURE: f32 = 90.0;

/// Lowest speed the PI controller commands (%).
pub const BASELINE_FAN_SPEED: u32 = 30;

/// Curve hysteresis band (°C).
pub const DEFAULT_TEMPERATURE_HYSTERESIS: u32 = 5;

// =============================================================================
// Validators
// =============================================================================

pub fn validate_target_temperature(value: f32) -> Result<f32, ConfigError> {
    if !(MIN_TARGET_TEMPERATURE..=MAX_TARGET_TEMPERATURE).contains(&value) {
        return Err(ConfigError::InvalidTargetTemperature {
            value,
            min: MIN_TARGET_TEMPERATURE,
            max: MAX_TARGET_TEMPERATURE,
        });
    }
    Ok(value)
}

pub fn validate_proportional_gain(value: f32) -> Result<f32, ConfigError> {
    if !(MIN_PROPORTIONAL_GAIN..=MAX_PROPORTIONAL_GAIN).contains(&value) {
        return Err(ConfigError::InvalidGain {
            name: "Proportional",
            value,
            min: MIN_PROPORTIONAL_GAIN,
            max: MAX_PROPORTIONAL_GAIN,
        });
    }
    Ok(value)
}

/// Validate the integral gain.
///
/// Zero is accepted and turns the controller into a pure P regulator.
pub fn validate_integral_gain(value: f32) -> Result<f32, ConfigError> {
    if value != 0.0 && !(MIN_INTEGRAL_GAIN..=MAX_INTEGRAL_GAIN).contains(&value) {
        return Err(ConfigError::InvalidGain {
            name: "Integral",
            value,
            min: MIN_INTEGRAL_GAIN,
            max: MAX_INTEGRAL_GAIN,
        });
    }
    Ok(value)
}

pub fn validate_update_period(value: u32) -> Result<u32, ConfigError> {
    validate_sample_interval(value as f32).map(|_| value)
}

/// Validate a sample interval in seconds.
pub fn validate_sample_interval(value: f32) -> Result<f32, ConfigError> {
    let min = MIN_FAN_SPEED_UPDATE_PERIOD as f32;
    let max = MAX_FAN_SPEED_UPDATE_PERIOD as f32;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::InvalidUpdatePeriod {
            value,
            min: MIN_FAN_SPEED_UPDATE_PERIOD,
            max: MAX_FAN_SPEED_UPDATE_PERIOD,
        });
    }
    Ok(value)
}

pub fn validate_hysteresis(value: u32) -> Result<u32, ConfigError> {
    if value > MAX_TEMPERATURE {
        return Err(ConfigError::InvalidHysteresis {
            value,
            max: MAX_TEMPERATURE,
        });
    }
    Ok(value)
}

pub fn validate_fan_speed_range(min: u32, max: u32) -> Result<(u32, u32), ConfigError> {
    if min > max || max > MAX_FAN_SPEED {
        return Err(ConfigError::InvalidFanSpeedRange {
            min,
            max,
            limit: MAX_FAN_SPEED,
        });
    }
    Ok((min, max))
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// Fan control strategy selected for this run.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMode {
    /// Closed-loop regulation towards a target temperature.
    Pi(ControllerConfig),
    /// Table lookup with hysteresis.
    Curve { curve: FanCurve, hysteresis: u32 },
    /// Apply clocks and power only, no fan control.
    None,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::Pi(config) => write!(
                f,
                "PI (target: {}°C, kp: {}, ki: {})",
                config.target_temperature, config.kp, config.ki
            ),
            ControlMode::Curve { curve, hysteresis } => {
                write!(f, "Curve ({}, hysteresis: {}°C)", curve, hysteresis)
            }
            ControlMode::None => write!(f, "None"),
        }
    }
}

/// Fully validated configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TunerSettings {
    pub gpu_index: u32,
    pub core_clock_offset: Option<i32>,
    pub memory_clock_offset: Option<i32>,
    pub max_core_clock: Option<u32>,
    pub max_memory_clock: Option<u32>,
    /// Watts.
    pub power_limit: Option<u32>,
    /// Seconds.
    pub update_period: u32,
    pub mode: ControlMode,
}

impl TunerSettings {
    /// Validate stored settings into a run configuration.
    pub fn from_stored(stored: &StoredSettings) -> Result<Self, ConfigError> {
        let update_period = validate_update_period(stored.fan_speed_update_period)?;

        let mode = match (stored.target_temperature, stored.pairs.as_deref()) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingModes),
            (Some(target), None) => {
                let config = ControllerConfig::new(
                    target,
                    stored.proportional_gain,
                    stored.integral_gain,
                    update_period as f32,
                )
                .with_fan_speed_range(stored.min_fan_speed, stored.max_fan_speed);
                config.validate()?;
                ControlMode::Pi(config)
            }
            (None, Some(pairs)) => ControlMode::Curve {
                curve: pairs.parse()?,
                hysteresis: validate_hysteresis(stored.temperature_hysteresis)?,
            },
            (None, None) => ControlMode::None,
        };

        Ok(Self {
            gpu_index: stored.gpu_index,
            core_clock_offset: stored.core_clock_offset,
            memory_clock_offset: stored.memory_clock_offset,
            max_core_clock: stored.max_core_clock,
            max_memory_clock: stored.max_memory_clock,
            power_limit: stored.power_limit,
            update_period,
            mode,
        })
    }

    /// True when any clock or power setting must be written to the device.
    pub fn has_device_tuning(&self) -> bool {
        self.core_clock_offset.is_some()
            || self.memory_clock_offset.is_some()
            || self.max_core_clock.is_some()
            || self.max_memory_clock.is_some()
            || self.power_limit.is_some()
    }
}

/// Values given on the command line, layered over the settings file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub gpu_index: Option<u32>,
    pub core_clock_offset: Option<i32>,
    pub memory_clock_offset: Option<i32>,
    pub max_core_clock: Option<u32>,
    pub max_memory_clock: Option<u32>,
    pub power_limit: Option<u32>,
    pub target_temperature: Option<f32>,
    pub pairs: Option<String>,
    pub fan_speed_update_period: Option<u32>,
    pub temperature_hysteresis: Option<u32>,
    pub proportional_gain: Option<f32>,
    pub integral_gain: Option<f32>,
    pub min_fan_speed: Option<u32>,
    pub max_fan_speed: Option<u32>,
}

impl SettingsOverrides {
    /// Layer these values over `stored`.
    ///
    /// Selecting a control mode here replaces the stored mode entirely.
    pub fn apply_to(&self, stored: &StoredSettings) -> StoredSettings {
        let mut merged = stored.clone();

        if self.target_temperature.is_some() || self.pairs.is_some() {
            merged.target_temperature = self.target_temperature;
            merged.pairs = self.pairs.clone();
        }

        if let Some(index) = self.gpu_index {
            merged.gpu_index = index;
        }
        merged.core_clock_offset = self.core_clock_offset.or(stored.core_clock_offset);
        merged.memory_clock_offset = self.memory_clock_offset.or(stored.memory_clock_offset);
        merged.max_core_clock = self.max_core_clock.or(stored.max_core_clock);
        merged.max_memory_clock = self.max_memory_clock.or(stored.max_memory_clock);
        merged.power_limit = self.power_limit.or(stored.power_limit);
        if let Some(period) = self.fan_speed_update_period {
            merged.fan_speed_update_period = period;
        }
        if let Some(hysteresis) = self.temperature_hysteresis {
            merged.temperature_hysteresis = hysteresis;
        }
        if let Some(kp) = self.proportional_gain {
            merged.proportional_gain = kp;
        }
        if let Some(ki) = self.integral_gain {
            merged.integral_gain = ki;
        }
        if let Some(min) = self.min_fan_speed {
            merged.min_fan_speed = min;
        }
        if let Some(max) = self.max_fan_speed {
            merged.max_fan_speed = max;
        }

        merged
    }

    /// Merge over `stored` and validate.
    pub fn resolve(&self, stored: &StoredSettings) -> Result<TunerSettings, ConfigError> {
        TunerSettings::from_stored(&self.apply_to(stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_validation() {
        assert!(validate_proportional_gain(1.5).is_ok());
        assert!(validate_proportional_gain(0.05).is_err());
        assert!(validate_proportional_gain(f32::NAN).is_err());

        assert!(validate_integral_gain(0.0).is_ok());
        assert!(validate_integral_gain(0.05).is_ok());
        assert!(validate_integral_gain(0.001).is_err());
        assert!(validate_integral_gain(1.5).is_err());
    }

    #[test]
    fn test_period_and_target_validation() {
        assert_eq!(validate_update_period(2), Ok(2));
        assert!(validate_update_period(0).is_err());
        assert!(validate_update_period(11).is_err());

        assert!(validate_target_temperature(65.0).is_ok());
        assert!(validate_target_temperature(29.9).is_err());
        assert!(validate_target_temperature(90.5).is_err());
    }

    #[test]
    fn test_fan_speed_range_validation() {
        assert!(validate_fan_speed_range(30, 100).is_ok());
        assert!(validate_fan_speed_range(50, 50).is_ok());
        assert!(validate_fan_speed_range(60, 40).is_err());
        assert!(validate_fan_speed_range(0, 101).is_err());
    }

    #[test]
    fn test_defaults_resolve_to_no_fan_control() {
        let settings = TunerSettings::from_stored(&StoredSettings::default()).unwrap();
        assert_eq!(settings.mode, ControlMode::None);
        assert_eq!(settings.update_period, DEFAULT_FAN_SPEED_UPDATE_PERIOD);
        assert!(!settings.has_device_tuning());
    }

    #[test]
    fn test_cli_overrides_stored_fields() {
        let stored = StoredSettings {
            gpu_index: 1,
            power_limit: Some(250),
            fan_speed_update_period: 5,
            ..StoredSettings::default()
        };
        let overrides = SettingsOverrides {
            fan_speed_update_period: Some(3),
            core_clock_offset: Some(150),
            ..SettingsOverrides::default()
        };

        let settings = overrides.resolve(&stored).unwrap();
        assert_eq!(settings.gpu_index, 1);
        assert_eq!(settings.power_limit, Some(250));
        assert_eq!(settings.core_clock_offset, Some(150));
        assert_eq!(settings.update_period, 3);
        assert!(settings.has_device_tuning());
    }

    #[test]
    fn test_cli_mode_replaces_stored_mode() {
        let stored = StoredSettings {
            pairs: Some("40:30,80:100".into()),
            ..StoredSettings::default()
        };
        let overrides = SettingsOverrides {
            target_temperature: Some(65.0),
            ..SettingsOverrides::default()
        };

        match overrides.resolve(&stored).unwrap().mode {
            ControlMode::Pi(config) => assert_eq!(config.target_temperature, 65.0),
            other => panic!("expected PI mode, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_stored_modes_rejected() {
        let stored = StoredSettings {
            target_temperature: Some(65.0),
            pairs: Some("40:30,80:100".into()),
            ..StoredSettings::default()
        };
        assert_eq!(
            TunerSettings::from_stored(&stored),
            Err(ConfigError::ConflictingModes)
        );
    }

    #[test]
    fn test_curve_mode_uses_hysteresis() {
        let overrides = SettingsOverrides {
            pairs: Some("40:30, 60:50, 80:100".into()),
            temperature_hysteresis: Some(3),
            ..SettingsOverrides::default()
        };

        match overrides.resolve(&StoredSettings::default()).unwrap().mode {
            ControlMode::Curve { curve, hysteresis } => {
                assert_eq!(curve.points().len(), 3);
                assert_eq!(hysteresis, 3);
            }
            other => panic!("expected curve mode, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pi_settings_rejected() {
        let overrides = SettingsOverrides {
            target_temperature: Some(65.0),
            min_fan_speed: Some(80),
            max_fan_speed: Some(60),
            ..SettingsOverrides::default()
        };
        assert!(matches!(
            overrides.resolve(&StoredSettings::default()),
            Err(ConfigError::InvalidFanSpeedRange { .. })
        ));
    }
}
