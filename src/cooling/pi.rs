//! Proportional-integral fan speed regulator.
//!
//! The controller maps the temperature error to a fan speed and keeps the
//! integral term inside what the output range can express (back-calculation
//! anti-windup).

use crate::config::{
    BASELINE_FAN_SPEED, MAX_FAN_SPEED, validate_fan_speed_range, validate_integral_gain,
    validate_proportional_gain, validate_sample_interval, validate_target_temperature,
};
use crate::error::ConfigError;

/// Parameters of a [`PiController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Setpoint in °C.
    pub target_temperature: f32,
    /// Output floor, also the baseline the P and I terms are added to.
    pub min_fan_speed: u32,
    pub max_fan_speed: u32,
    pub kp: f32,
    pub ki: f32,
    /// Seconds between two calls to [`PiController::calculate_fan_speed`].
    pub dt: f32,
}

impl ControllerConfig {
    /// Create a configuration with the default output range.
    pub fn new(target_temperature: f32, kp: f32, ki: f32, dt: f32) -> Self {
        Self {
            target_temperature,
            min_fan_speed: BASELINE_FAN_SPEED,
            max_fan_speed: MAX_FAN_SPEED,
            kp,
            ki,
            dt,
        }
    }

    pub fn with_fan_speed_range(mut self, min_fan_speed: u32, max_fan_speed: u32) -> Self {
        self.min_fan_speed = min_fan_speed;
        self.max_fan_speed = max_fan_speed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_target_temperature(self.target_temperature)?;
        validate_proportional_gain(self.kp)?;
        validate_integral_gain(self.ki)?;
        validate_sample_interval(self.dt)?;
        validate_fan_speed_range(self.min_fan_speed, self.max_fan_speed)?;
        Ok(())
    }
}

/// PI temperature controller.
///
/// # Example
///
/// ```
/// use nvidia_tuner::cooling::{ControllerConfig, PiController};
///
/// let config = ControllerConfig::new(60.0, 2.0, 0.0, 2.0);
/// let mut controller = PiController::new(config).unwrap();
///
/// // 10°C too hot: 30% baseline + 2.0 * 10
/// assert_eq!(controller.calculate_fan_speed(70.0), 50);
/// ```
#[derive(Debug, Clone)]
pub struct PiController {
    config: ControllerConfig,
    integral_error: f32,
}

impl PiController {
    /// Create a controller with an empty integral.
    pub fn new(config: ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            integral_error: 0.0,
        })
    }

    /// Create a controller that takes over from the current fan state.
    ///
    /// The integral is back-solved so that evaluating the control law at
    /// `current_temp` yields `current_fan_speed`, then one step of
    /// `error * dt` is removed because the next call adds it again.
    pub fn with_current_state(
        config: ControllerConfig,
        current_temp: f32,
        current_fan_speed: u32,
    ) -> Result<Self, ConfigError> {
        let mut controller = Self::new(config)?;

        if config.ki > 0.0 {
            let error = current_temp - config.target_temperature;
            let p_term = config.kp * error;
            controller.integral_error = (current_fan_speed as f32
                - config.min_fan_speed as f32
                - p_term)
                / config.ki
                - error * config.dt;
        }

        Ok(controller)
    }

    /// Compute the fan speed for one sample.
    ///
    /// Must be called once per `dt`. The result is always within
    /// `[min_fan_speed, max_fan_speed]`.
    pub fn calculate_fan_speed(&mut self, current_temp: f32) -> u32 {
        let ControllerConfig {
            target_temperature,
            min_fan_speed,
            max_fan_speed,
            kp,
            ki,
            dt,
        } = self.config;

        let error = current_temp - target_temperature;
        let p_term = kp * error;

        self.integral_error += error * dt;
        let i_term = ki * self.integral_error;

        let lower = min_fan_speed as f32;
        let upper = max_fan_speed as f32;
        let raw_output = lower + p_term + i_term;
        let output = raw_output.clamp(lower, upper);

        // Anti-windup: pull the integral back so the law lands on the bound.
        if output != raw_output && ki > 0.0 {
            self.integral_error -= (raw_output - output) / ki;
        }

        output.round() as u32
    }

    /// Discard the accumulated integral.
    pub fn reset(&mut self) {
        self.integral_error = 0.0;
    }

    /// Change the setpoint. The integral is reset since it belongs to the old one.
    pub fn set_target_temperature(&mut self, target: f32) -> Result<(), ConfigError> {
        self.config.target_temperature = validate_target_temperature(target)?;
        self.reset();
        Ok(())
    }

    pub fn target_temperature(&self) -> f32 {
        self.config.target_temperature
    }

    pub fn integral_error(&self) -> f32 {
        self.integral_error
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(target: f32, kp: f32, ki: f32) -> ControllerConfig {
        ControllerConfig::new(target, kp, ki, 2.0)
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PiController::new(config(20.0, 1.5, 0.05)).is_err());
        assert!(PiController::new(config(60.0, 50.0, 0.05)).is_err());
        assert!(PiController::new(config(60.0, 1.5, 5.0)).is_err());
        assert!(PiController::new(ControllerConfig::new(60.0, 1.5, 0.05, 0.0)).is_err());
        assert!(
            PiController::new(config(60.0, 1.5, 0.05).with_fan_speed_range(90, 40)).is_err()
        );
    }

    #[test]
    fn test_proportional_only_has_no_history() {
        let mut controller = PiController::new(config(50.0, 2.0, 0.0)).unwrap();

        assert_eq!(controller.calculate_fan_speed(60.0), 50);
        assert_eq!(controller.calculate_fan_speed(40.0), 30); // 10 clamps to min
        assert_eq!(controller.calculate_fan_speed(90.0), 100); // 110 clamps to max

        // Same reading after a different history gives the same output
        for _ in 0..20 {
            controller.calculate_fan_speed(95.0);
        }
        assert_eq!(controller.calculate_fan_speed(60.0), 50);
        assert_eq!(controller.calculate_fan_speed(55.5), 41);
    }

    #[test]
    fn test_integral_accumulates() {
        let mut controller = PiController::new(config(60.0, 1.0, 0.1)).unwrap();

        // error 5: p = 5, integral = 10, i = 1
        assert_eq!(controller.calculate_fan_speed(65.0), 36);
        // integral = 20, i = 2
        assert_eq!(controller.calculate_fan_speed(65.0), 37);
        assert!((controller.integral_error() - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_output_stays_in_range() {
        let mut controller =
            PiController::new(config(60.0, 10.0, 1.0).with_fan_speed_range(20, 80)).unwrap();

        for temp in [0.0, 100.0, 30.0, 95.0, 61.0, 59.0, 100.0, 0.0] {
            let speed = controller.calculate_fan_speed(temp);
            assert!((20..=80).contains(&speed), "speed {} out of range", speed);
        }
    }

    #[test]
    fn test_anti_windup_releases_immediately() {
        let mut controller = PiController::new(config(60.0, 1.5, 0.05)).unwrap();

        for _ in 0..100 {
            assert!(controller.calculate_fan_speed(95.0) <= 100);
        }
        assert_eq!(controller.calculate_fan_speed(95.0), 100);

        // Saturated integral is bounded by what the range can express
        let i_term = controller.config().ki * controller.integral_error();
        assert!((i_term - 17.5).abs() < 1e-3, "i_term = {}", i_term);

        // First cold reading leaves the upper bound right away
        assert_eq!(controller.calculate_fan_speed(30.0), 30);
    }

    #[test]
    fn test_lower_bound_anti_windup() {
        let mut controller = PiController::new(config(70.0, 2.0, 0.5)).unwrap();

        for _ in 0..50 {
            assert_eq!(controller.calculate_fan_speed(40.0), 30);
        }

        // Integral held at what keeps the output on the lower bound
        let p_term = 2.0 * (40.0 - 70.0);
        let i_term = 0.5 * controller.integral_error();
        assert!((30.0 + p_term + i_term - 30.0).abs() < 1e-3);

        // Reaching the target responds on the very next call
        assert!(controller.calculate_fan_speed(75.0) > 30);
    }

    #[test]
    fn test_takeover_without_jump() {
        let config = ControllerConfig::new(45.0, 4.0, 0.2, 2.0).with_fan_speed_range(30, 100);
        let mut controller = PiController::with_current_state(config, 50.0, 60).unwrap();

        assert_eq!(controller.calculate_fan_speed(50.0), 60);
    }

    #[test]
    fn test_takeover_with_zero_ki_starts_empty() {
        let mut controller =
            PiController::with_current_state(config(45.0, 4.0, 0.0), 50.0, 60).unwrap();

        assert_eq!(controller.integral_error(), 0.0);
        assert_eq!(controller.calculate_fan_speed(50.0), 50);
    }

    #[test]
    fn test_takeover_from_stopped_fan() {
        // Fans spun down below the controller floor
        let mut controller =
            PiController::with_current_state(config(65.0, 1.5, 0.05), 40.0, 0).unwrap();

        assert_eq!(controller.calculate_fan_speed(40.0), 30);
        assert_eq!(controller.calculate_fan_speed(40.0), 30);
    }

    #[test]
    fn test_set_target_resets_integral() {
        let mut controller = PiController::new(config(60.0, 1.5, 0.05)).unwrap();
        controller.calculate_fan_speed(70.0);
        assert!(controller.integral_error() > 0.0);

        controller.set_target_temperature(70.0).unwrap();
        assert_eq!(controller.integral_error(), 0.0);
        assert_eq!(controller.target_temperature(), 70.0);

        assert!(controller.set_target_temperature(95.0).is_err());
        assert_eq!(controller.target_temperature(), 70.0);
    }

    #[test]
    fn test_reset() {
        let mut controller = PiController::new(config(60.0, 1.5, 0.05)).unwrap();
        controller.calculate_fan_speed(80.0);
        controller.reset();
        assert_eq!(controller.integral_error(), 0.0);
    }
}
