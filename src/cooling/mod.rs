//! Cooling control module.
//!
//! Provides the PI regulator, fan curve interpolation with hysteresis, and
//! the periodic loop that drives a device with either of them.

mod curve;
pub mod daemon;
mod hysteresis;
mod pi;

pub use curve::{FanCurve, TempFanPoint, interpolate};
pub use daemon::ControlLoop;
pub use hysteresis::Hysteresis;
pub use pi::{ControllerConfig, PiController};
