//! Device abstraction layer for NVIDIA GPUs.
//!
//! NVML is loaded at runtime; the control loop only sees the [`GpuDevice`]
//! trait so it can run against a mock.

mod ffi;
pub mod gpu;
pub mod nvml;

pub use gpu::NvmlDevice;
pub use nvml::{Capabilities, NvmlLibrary, check_driver_major, parse_driver_major};

use crate::error::Result;

/// What the fan control loop needs from a GPU.
pub trait GpuDevice {
    /// Core temperature in °C.
    fn temperature(&self) -> Result<u32>;

    /// Current fan speed in percent, `None` when the driver cannot report it.
    fn current_fan_speed(&self) -> Result<Option<u32>>;

    /// Set all fans to `speed` percent.
    fn set_fan_speed(&self, speed: u32) -> Result<()>;

    /// Return all fans to the driver's automatic policy.
    fn restore_default_fan_speed(&self) -> Result<()>;
}
