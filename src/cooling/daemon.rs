//! Periodic fan control loop.
//!
//! Samples the GPU temperature once per period, turns it into a fan speed
//! with either the PI controller or the fan curve, and writes it to the
//! device until shutdown is requested.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::curve::FanCurve;
use super::hysteresis::Hysteresis;
use super::pi::{ControllerConfig, PiController};
use crate::config::{ControlMode, MAX_FAN_SPEED, MAX_TEMPERATURE};
use crate::device::GpuDevice;
use crate::error::{Result, TunerError};
use crate::shutdown::ShutdownSignal;

/// Drives one device until the shutdown signal fires.
pub struct ControlLoop<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    shutdown: &'a ShutdownSignal,
    period: Duration,
}

impl<'a, D: GpuDevice + ?Sized> ControlLoop<'a, D> {
    pub fn new(device: &'a D, shutdown: &'a ShutdownSignal, period: Duration) -> Self {
        Self {
            device,
            shutdown,
            period,
        }
    }

    /// Run the loop for `mode`. Returns the number of completed cycles.
    ///
    /// [`ControlMode::None`] returns immediately without touching the fans.
    pub fn run(&self, mode: &ControlMode) -> Result<u64> {
        match mode {
            ControlMode::Pi(config) => self.run_pi(*config),
            ControlMode::Curve { curve, hysteresis } => self.run_curve(curve, *hysteresis),
            ControlMode::None => Ok(0),
        }
    }

    /// Regulate towards the configured target. Writes every cycle.
    pub fn run_pi(&self, config: ControllerConfig) -> Result<u64> {
        let mut controller = self.seed_controller(config)?;
        info!(
            "PI fan control started (target: {}°C, kp: {}, ki: {}, period: {}s)",
            config.target_temperature,
            config.kp,
            config.ki,
            self.period.as_secs()
        );

        self.cycle(|temperature| {
            let speed = controller.calculate_fan_speed(temperature as f32);
            debug!(
                temperature,
                speed,
                integral = controller.integral_error(),
                "PI cycle"
            );
            Some(speed)
        })
    }

    /// Follow `curve`. Only writes when the speed changes.
    pub fn run_curve(&self, curve: &FanCurve, hysteresis: u32) -> Result<u64> {
        let mut state = Hysteresis::new(hysteresis);
        info!(
            "Curve fan control started (curve: {}, hysteresis: {}°C, period: {}s)",
            curve,
            hysteresis,
            self.period.as_secs()
        );

        self.cycle(|temperature| {
            let effective = state.effective_temperature(temperature, curve);
            let speed = curve.interpolate(effective);
            let changed = state.record_output(speed);
            debug!(temperature, effective, speed, changed, "Curve cycle");
            changed.then_some(speed)
        })
    }

    /// Read the temperature and reject values outside the sensor scale.
    pub fn read_temperature(&self) -> Result<u32> {
        let temperature = self.device.temperature()?;
        if temperature > MAX_TEMPERATURE {
            return Err(TunerError::SensorRange {
                value: temperature,
                max: MAX_TEMPERATURE,
            });
        }
        Ok(temperature)
    }

    fn seed_controller(&self, config: ControllerConfig) -> Result<PiController> {
        let current_speed = match self.device.current_fan_speed() {
            Ok(speed) => speed.filter(|speed| *speed <= MAX_FAN_SPEED),
            Err(e) => {
                warn!("Could not read current fan speed, starting from zero: {}", e);
                None
            }
        };

        let controller = match current_speed {
            Some(speed) => {
                let temperature = self.read_temperature()?;
                debug!(temperature, speed, "Seeding PI controller from current state");
                PiController::with_current_state(config, temperature as f32, speed)?
            }
            None => PiController::new(config)?,
        };
        Ok(controller)
    }

    /// Shared loop body. `step` returns the speed to write, if any.
    fn cycle<F>(&self, mut step: F) -> Result<u64>
    where
        F: FnMut(u32) -> Option<u32>,
    {
        let mut cycles = 0;

        while !self.shutdown.is_requested() {
            let temperature = self.read_temperature()?;
            if let Some(speed) = step(temperature) {
                self.device.set_fan_speed(speed)?;
            }
            cycles += 1;

            if self.shutdown.wait(self.period) {
                break;
            }
        }

        info!("Fan control stopped after {} cycles", cycles);
        Ok(cycles)
    }
}
