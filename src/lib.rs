//! NVIDIA Tuner Library
//!
//! Fan control and tuning for NVIDIA GPUs through NVML.
//!
//! # Features
//!
//! - PI fan control towards a target temperature, with anti-windup
//! - Fan curve interpolation with hysteresis
//! - Core/memory clock offsets, clock limits and power limit
//! - Automatic fan policy restored on exit
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use nvidia_tuner::cooling::{ControlLoop, FanCurve};
//! use nvidia_tuner::device::{NvmlDevice, NvmlLibrary};
//! use nvidia_tuner::shutdown::{FanRestoreGuard, ShutdownSignal};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let nvml = NvmlLibrary::load()?;
//!     nvml.check_driver_version()?;
//!
//!     let gpu = NvmlDevice::open(&nvml, 0)?;
//!     let curve: FanCurve = "40:30,60:50,80:100".parse()?;
//!
//!     let shutdown = ShutdownSignal::install()?;
//!     let guard = FanRestoreGuard::new(&gpu);
//!     ControlLoop::new(&gpu, &shutdown, Duration::from_secs(2)).run_curve(&curve, 5)?;
//!     guard.finish()?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cooling;
pub mod device;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use config::{ControlMode, TunerSettings};
pub use device::{GpuDevice, NvmlDevice, NvmlLibrary};
pub use error::{ConfigError, Result, TunerError};
