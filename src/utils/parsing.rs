//! Parsing utilities for CLI arguments and configuration values.
//!
//! The `parse_*` value parsers are plugged into clap and run the same
//! validators the library uses, so a bad flag is rejected before startup.

use crate::config::{
    MAX_FAN_SPEED, validate_hysteresis, validate_integral_gain, validate_proportional_gain,
    validate_target_temperature, validate_update_period,
};
use crate::cooling::TempFanPoint;
use crate::error::ConfigError;

// =============================================================================
// Fan Curve Parsing
// =============================================================================

/// Parse `"t1:f1,t2:f2,..."` into curve points.
///
/// Whitespace around tokens is ignored. Ordering and ranges are checked by
/// [`FanCurve::new`](crate::cooling::FanCurve::new), not here.
///
/// # Example
/// ```
/// use nvidia_tuner::utils::parsing::parse_temperature_fan_speed_pairs;
///
/// let points = parse_temperature_fan_speed_pairs("40:30, 60:50").unwrap();
/// assert_eq!(points.len(), 2);
/// assert_eq!(points[1].fan_speed, 50);
/// ```
pub fn parse_temperature_fan_speed_pairs(s: &str) -> Result<Vec<TempFanPoint>, ConfigError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }

    s.split(',')
        .map(|pair| {
            let malformed = || ConfigError::MalformedPair(pair.trim().to_string());
            let (temperature, fan_speed) = pair.split_once(':').ok_or_else(malformed)?;
            let temperature = temperature.trim().parse().map_err(|_| malformed())?;
            let fan_speed = fan_speed.trim().parse().map_err(|_| malformed())?;
            Ok(TempFanPoint::new(temperature, fan_speed))
        })
        .collect()
}

// =============================================================================
// CLI Value Parsers
// =============================================================================

fn parse_number<T: std::str::FromStr>(s: &str, what: &str) -> Result<T, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a valid {}", s, what))
}

/// Target temperature in °C.
pub fn parse_target_temperature(s: &str) -> Result<f32, String> {
    validate_target_temperature(parse_number(s, "temperature")?).map_err(|e| e.to_string())
}

pub fn parse_proportional_gain(s: &str) -> Result<f32, String> {
    validate_proportional_gain(parse_number(s, "gain")?).map_err(|e| e.to_string())
}

pub fn parse_integral_gain(s: &str) -> Result<f32, String> {
    validate_integral_gain(parse_number(s, "gain")?).map_err(|e| e.to_string())
}

/// Update period in whole seconds.
pub fn parse_update_period(s: &str) -> Result<u32, String> {
    validate_update_period(parse_number(s, "period")?).map_err(|e| e.to_string())
}

pub fn parse_hysteresis(s: &str) -> Result<u32, String> {
    validate_hysteresis(parse_number(s, "temperature")?).map_err(|e| e.to_string())
}

/// Fan speed in percent.
pub fn parse_fan_speed(s: &str) -> Result<u32, String> {
    let speed: u32 = parse_number(s, "fan speed")?;
    if speed > MAX_FAN_SPEED {
        return Err(ConfigError::FanSpeedOutOfRange {
            value: speed,
            max: MAX_FAN_SPEED,
        }
        .to_string());
    }
    Ok(speed)
}

/// Checks the pairs syntax only; the curve is validated when settings resolve.
pub fn parse_pairs(s: &str) -> Result<String, String> {
    parse_temperature_fan_speed_pairs(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

// =============================================================================
// Tests
// =============================================================================
