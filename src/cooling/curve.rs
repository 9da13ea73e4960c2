//! Temperature to fan speed lookup table.
//!
//! A [`FanCurve`] can only be built through validation, so interpolation
//! never has to check anything at runtime.

use std::str::FromStr;

use crate::config::{MAX_FAN_SPEED, MAX_TEMPERATURE};
use crate::error::ConfigError;
use crate::utils::parsing::parse_temperature_fan_speed_pairs;

/// One breakpoint of a fan curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempFanPoint {
    /// °C
    pub temperature: u32,
    /// %
    pub fan_speed: u32,
}

impl TempFanPoint {
    pub const fn new(temperature: u32, fan_speed: u32) -> Self {
        Self {
            temperature,
            fan_speed,
        }
    }
}

impl From<(u32, u32)> for TempFanPoint {
    fn from((temperature, fan_speed): (u32, u32)) -> Self {
        Self::new(temperature, fan_speed)
    }
}

/// Validated, monotonic fan curve.
///
/// Invariants: at least one point, temperatures strictly increasing, fan
/// speeds non-decreasing, every value within the temperature and fan speed
/// scales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanCurve {
    points: Vec<TempFanPoint>,
}

impl FanCurve {
    /// Validate `points` into a curve.
    pub fn new(points: Vec<TempFanPoint>) -> Result<Self, ConfigError> {
        if points.is_empty() {
            return Err(ConfigError::EmptyCurve);
        }

        for point in &points {
            if point.temperature > MAX_TEMPERATURE {
                return Err(ConfigError::TemperatureOutOfRange {
                    value: point.temperature,
                    max: MAX_TEMPERATURE,
                });
            }
            if point.fan_speed > MAX_FAN_SPEED {
                return Err(ConfigError::FanSpeedOutOfRange {
                    value: point.fan_speed,
                    max: MAX_FAN_SPEED,
                });
            }
        }

        for (i, window) in points.windows(2).enumerate() {
            let (previous, current) = (window[0], window[1]);
            if current.temperature <= previous.temperature {
                return Err(ConfigError::TemperatureNotIncreasing {
                    index: i + 1,
                    previous: previous.temperature,
                    current: current.temperature,
                });
            }
            if current.fan_speed < previous.fan_speed {
                return Err(ConfigError::FanSpeedDecreasing {
                    index: i + 1,
                    previous: previous.fan_speed,
                    current: current.fan_speed,
                });
            }
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[TempFanPoint] {
        &self.points
    }

    pub fn first(&self) -> TempFanPoint {
        self.points[0]
    }

    pub fn last(&self) -> TempFanPoint {
        self.points[self.points.len() - 1]
    }

    /// Fan speed for `temp`. See [`interpolate`].
    pub fn interpolate(&self, temp: u32) -> u32 {
        interpolate(self, temp)
    }
}

impl FromStr for FanCurve {
    type Err = ConfigError;

    /// Parse and validate `"t1:f1,t2:f2,..."`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(parse_temperature_fan_speed_pairs(s)?)
    }
}

impl std::fmt::Display for FanCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, point) in self.points.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", point.temperature, point.fan_speed)?;
        }
        Ok(())
    }
}

/// Interpolate the fan speed for a temperature.
///
/// Below the first breakpoint the first speed is used, above the last one
/// the last speed. In between, the result is the linear interpolation of the
/// bracketing pair, rounded half-up.
///
/// # Example
///
/// ```
/// use nvidia_tuner::cooling::{FanCurve, interpolate};
///
/// let curve: FanCurve = "40:30,60:50,80:100".parse().unwrap();
/// assert_eq!(interpolate(&curve, 50), 40);
/// assert_eq!(interpolate(&curve, 39), 30);
/// assert_eq!(interpolate(&curve, 81), 100);
/// ```
pub fn interpolate(curve: &FanCurve, temp: u32) -> u32 {
    let first = curve.first();
    let last = curve.last();

    if temp <= first.temperature {
        return first.fan_speed;
    }
    if temp >= last.temperature {
        return last.fan_speed;
    }

    // first < temp < last, so 1 <= upper_idx <= len - 1
    let points = curve.points();
    let upper_idx = points.partition_point(|p| p.temperature <= temp);
    let lower = points[upper_idx - 1];
    let upper = points[upper_idx];

    let span = upper.temperature - lower.temperature;
    let weighted =
        lower.fan_speed * (upper.temperature - temp) + upper.fan_speed * (temp - lower.temperature);

    // weighted / span rounded half-up, in integers
    (2 * weighted + span) / (2 * span)
}
