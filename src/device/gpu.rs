//! NVIDIA GPU device handle.
//!
//! High-level interface over one NVML device: temperature, fans, clocks and
//! power limit.

use std::cell::Cell;
use std::ffi::{c_int, c_uint};
use std::ptr;

use tracing::{debug, info, warn};

use super::GpuDevice;
use super::ffi::{NVML_TEMPERATURE_GPU, NvmlDeviceHandle};
use super::nvml::NvmlLibrary;
use crate::error::{ConfigError, Result, TunerError};

// =============================================================================
// NvmlDevice
// =============================================================================

/// Handle to one GPU, borrowed from a loaded [`NvmlLibrary`].
///
/// # Example
///
/// ```no_run
/// use nvidia_tuner::device::{NvmlDevice, NvmlLibrary};
///
/// let nvml = NvmlLibrary::load()?;
/// nvml.check_driver_version()?;
///
/// let gpu = NvmlDevice::open(&nvml, 0)?;
/// println!("GPU temperature: {}°C", gpu.temperature()?);
/// # Ok::<(), nvidia_tuner::error::TunerError>(())
/// ```
pub struct NvmlDevice<'lib> {
    nvml: &'lib NvmlLibrary,
    handle: NvmlDeviceHandle,
    index: u32,
    num_fans: u32,
    default_restored: Cell<bool>,
}

impl<'lib> NvmlDevice<'lib> {
    /// Open the GPU at `index` and query its fan count.
    ///
    /// Drivers without `nvmlDeviceGetNumFans` are assumed to drive one fan.
    pub fn open(nvml: &'lib NvmlLibrary, index: u32) -> Result<Self> {
        let api = nvml.api();

        let mut handle: NvmlDeviceHandle = ptr::null_mut();
        // SAFETY: handle is a valid out pointer.
        let ret = unsafe { (api.device_get_handle_by_index)(index as c_uint, &mut handle) };
        nvml.check(ret, &format!("get handle for GPU {}", index))?;

        let num_fans = match api.device_get_num_fans {
            Some(get_num_fans) => {
                let mut count: c_uint = 0;
                // SAFETY: handle came from NVML above, count is a valid out pointer.
                let ret = unsafe { get_num_fans(handle, &mut count) };
                nvml.check(ret, "get fan count")?;
                count
            }
            None => {
                debug!("Fan count unavailable, assuming a single fan");
                1
            }
        };

        info!("Opened GPU {} with {} fan(s)", index, num_fans);

        Ok(Self {
            nvml,
            handle,
            index,
            num_fans,
            default_restored: Cell::new(false),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn fan_count(&self) -> u32 {
        self.num_fans
    }

    /// Core temperature in °C.
    pub fn temperature(&self) -> Result<u32> {
        let mut temp: c_uint = 0;
        // SAFETY: handle is valid for the lifetime of the library borrow.
        let ret = unsafe {
            (self.nvml.api().device_get_temperature)(self.handle, NVML_TEMPERATURE_GPU, &mut temp)
        };
        self.nvml.check(ret, "get temperature")?;
        Ok(temp)
    }

    /// Current speed of `fan` in percent.
    pub fn fan_speed(&self, fan: u32) -> Result<u32> {
        let get_fan_speed = self
            .nvml
            .api()
            .device_get_fan_speed
            .ok_or(TunerError::Unsupported {
                feature: "fan speed query",
            })?;

        let mut speed: c_uint = 0;
        // SAFETY: handle is valid, speed is a valid out pointer.
        let ret = unsafe { get_fan_speed(self.handle, fan as c_uint, &mut speed) };
        self.nvml.check(ret, &format!("get speed of fan {}", fan))?;
        Ok(speed)
    }

    /// Fail early when this driver cannot set fan speeds.
    pub fn require_fan_control(&self) -> Result<()> {
        if self.nvml.capabilities().fan_control {
            Ok(())
        } else {
            Err(TunerError::Unsupported {
                feature: "fan speed control",
            })
        }
    }

    // =========================================================================
    // Clocks and Power
    // =========================================================================

    /// Offset the graphics clock by `offset` MHz.
    pub fn set_core_clock_offset(&self, offset: i32) -> Result<()> {
        let set_offset = self
            .nvml
            .api()
            .device_set_gpc_clk_vf_offset
            .ok_or(TunerError::Unsupported {
                feature: "core clock offset",
            })?;

        // SAFETY: handle is valid.
        let ret = unsafe { set_offset(self.handle, offset as c_int) };
        self.nvml.check(ret, "set core clock offset")?;
        info!("Core clock offset set to {} MHz", offset);
        Ok(())
    }

    /// Offset the memory clock by `offset` MHz.
    pub fn set_memory_clock_offset(&self, offset: i32) -> Result<()> {
        let set_offset = self
            .nvml
            .api()
            .device_set_mem_clk_vf_offset
            .ok_or(TunerError::Unsupported {
                feature: "memory clock offset",
            })?;

        // SAFETY: handle is valid.
        let ret = unsafe { set_offset(self.handle, offset as c_int) };
        self.nvml.check(ret, "set memory clock offset")?;
        info!("Memory clock offset set to {} MHz", offset);
        Ok(())
    }

    /// Lock the graphics clock to at most `max_clock` MHz.
    pub fn set_max_core_clock(&self, max_clock: u32) -> Result<()> {
        let set_locked = self
            .nvml
            .api()
            .device_set_gpu_locked_clocks
            .ok_or(TunerError::Unsupported {
                feature: "locked core clocks",
            })?;

        // SAFETY: handle is valid.
        let ret = unsafe { set_locked(self.handle, 0, max_clock as c_uint) };
        self.nvml.check(ret, "set max core clock")?;
        info!("Max core clock set to {} MHz", max_clock);
        Ok(())
    }

    /// Lock the memory clock to at most `max_clock` MHz.
    pub fn set_max_memory_clock(&self, max_clock: u32) -> Result<()> {
        let set_locked = self
            .nvml
            .api()
            .device_set_memory_locked_clocks
            .ok_or(TunerError::Unsupported {
                feature: "locked memory clocks",
            })?;

        // SAFETY: handle is valid.
        let ret = unsafe { set_locked(self.handle, 0, max_clock as c_uint) };
        self.nvml.check(ret, "set max memory clock")?;
        info!("Max memory clock set to {} MHz", max_clock);
        Ok(())
    }

    /// Set the board power limit in watts.
    pub fn set_power_limit(&self, watts: u32) -> Result<()> {
        let milliwatts = watts
            .checked_mul(1000)
            .ok_or(ConfigError::InvalidPowerLimit { value: watts })?;

        // SAFETY: handle is valid.
        let ret = unsafe {
            (self.nvml.api().device_set_power_management_limit)(self.handle, milliwatts as c_uint)
        };
        self.nvml.check(ret, "set power limit")?;
        info!("Power limit set to {} W", watts);
        Ok(())
    }

    // =========================================================================
    // Fans
    // =========================================================================

    /// Set every fan to `speed` percent.
    ///
    /// Ignored once the default policy has been restored, so a late write
    /// from the loop can never override it.
    pub fn set_fan_speed(&self, speed: u32) -> Result<()> {
        if self.default_restored.get() {
            debug!("Fan write of {}% skipped, default policy restored", speed);
            return Ok(());
        }

        let set_speed = self
            .nvml
            .api()
            .device_set_fan_speed
            .ok_or(TunerError::Unsupported {
                feature: "fan speed control",
            })?;

        for fan in 0..self.num_fans {
            // SAFETY: handle is valid, fan is below the reported fan count.
            let ret = unsafe { set_speed(self.handle, fan as c_uint, speed as c_uint) };
            self.nvml.check(ret, &format!("set speed of fan {}", fan))?;
        }
        Ok(())
    }

    /// Hand every fan back to the driver's automatic policy.
    ///
    /// Idempotent. Fans that fail are logged and the rest are still restored.
    pub fn restore_default_fan_speed(&self) -> Result<()> {
        if self.default_restored.replace(true) {
            return Ok(());
        }

        let set_default = self
            .nvml
            .api()
            .device_set_default_fan_speed
            .ok_or(TunerError::Unsupported {
                feature: "default fan speed",
            })?;

        let mut first_error = None;
        for fan in 0..self.num_fans {
            // SAFETY: handle is valid, fan is below the reported fan count.
            let ret = unsafe { set_default(self.handle, fan as c_uint) };
            if let Err(e) = self.nvml.check(ret, &format!("restore default speed of fan {}", fan))
            {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Default fan policy restored on GPU {}", self.index);
                Ok(())
            }
        }
    }
}

impl GpuDevice for NvmlDevice<'_> {
    fn temperature(&self) -> Result<u32> {
        NvmlDevice::temperature(self)
    }

    fn current_fan_speed(&self) -> Result<Option<u32>> {
        if !self.nvml.capabilities().fan_speed_query || self.num_fans == 0 {
            return Ok(None);
        }
        self.fan_speed(0).map(Some)
    }

    fn set_fan_speed(&self, speed: u32) -> Result<()> {
        NvmlDevice::set_fan_speed(self, speed)
    }

    fn restore_default_fan_speed(&self) -> Result<()> {
        NvmlDevice::restore_default_fan_speed(self)
    }
}
