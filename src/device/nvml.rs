//! Runtime binding to the NVML shared library.
//!
//! All symbols are resolved once in [`NvmlLibrary::load`]. Entry points that
//! only exist on newer driver branches are optional and reported through
//! [`Capabilities`], so callers never probe the library again.

use std::ffi::{CStr, c_char, c_uint};

use libloading::Library;
use tracing::{debug, info, warn};

use super::ffi::*;
use crate::config::MAJOR_MIN_VERSION;
use crate::error::{Result, TunerError};

// =============================================================================
// Capabilities
// =============================================================================

/// Optional NVML features exported by the loaded driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub core_clock_offset: bool,
    pub memory_clock_offset: bool,
    pub locked_core_clocks: bool,
    pub locked_memory_clocks: bool,
    pub fan_count: bool,
    pub fan_speed_query: bool,
    pub fan_control: bool,
    pub default_fan_speed: bool,
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let features = [
            ("core-clock-offset", self.core_clock_offset),
            ("memory-clock-offset", self.memory_clock_offset),
            ("locked-core-clocks", self.locked_core_clocks),
            ("locked-memory-clocks", self.locked_memory_clocks),
            ("fan-count", self.fan_count),
            ("fan-speed-query", self.fan_speed_query),
            ("fan-control", self.fan_control),
            ("default-fan-speed", self.default_fan_speed),
        ];
        let supported: Vec<&str> = features
            .iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect();

        if supported.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", supported.join(", "))
        }
    }
}

// =============================================================================
// Entry Point Table
// =============================================================================

pub(crate) struct Api {
    pub init: InitFn,
    pub shutdown: ShutdownFn,
    pub error_string: ErrorStringFn,
    pub system_get_driver_version: SystemGetDriverVersionFn,
    pub device_get_handle_by_index: DeviceGetHandleByIndexFn,
    pub device_get_temperature: DeviceGetTemperatureFn,
    pub device_set_power_management_limit: DeviceSetPowerManagementLimitFn,
    pub device_get_num_fans: Option<DeviceGetNumFansFn>,
    pub device_get_fan_speed: Option<DeviceGetFanSpeedFn>,
    pub device_set_fan_speed: Option<DeviceSetFanSpeedFn>,
    pub device_set_default_fan_speed: Option<DeviceSetDefaultFanSpeedFn>,
    pub device_set_gpc_clk_vf_offset: Option<DeviceSetClkVfOffsetFn>,
    pub device_set_mem_clk_vf_offset: Option<DeviceSetClkVfOffsetFn>,
    pub device_set_gpu_locked_clocks: Option<DeviceSetLockedClocksFn>,
    pub device_set_memory_locked_clocks: Option<DeviceSetLockedClocksFn>,
}

impl Api {
    fn resolve(library: &Library) -> Result<Self> {
        Ok(Self {
            init: required(library, SYM_INIT)?,
            shutdown: required(library, SYM_SHUTDOWN)?,
            error_string: required(library, SYM_ERROR_STRING)?,
            system_get_driver_version: required(library, SYM_SYSTEM_GET_DRIVER_VERSION)?,
            device_get_handle_by_index: required(library, SYM_DEVICE_GET_HANDLE_BY_INDEX)?,
            device_get_temperature: required(library, SYM_DEVICE_GET_TEMPERATURE)?,
            device_set_power_management_limit: required(
                library,
                SYM_DEVICE_SET_POWER_MANAGEMENT_LIMIT,
            )?,
            device_get_num_fans: optional(library, SYM_DEVICE_GET_NUM_FANS),
            device_get_fan_speed: optional(library, SYM_DEVICE_GET_FAN_SPEED),
            device_set_fan_speed: optional(library, SYM_DEVICE_SET_FAN_SPEED),
            device_set_default_fan_speed: optional(library, SYM_DEVICE_SET_DEFAULT_FAN_SPEED),
            device_set_gpc_clk_vf_offset: optional(library, SYM_DEVICE_SET_GPC_CLK_VF_OFFSET),
            device_set_mem_clk_vf_offset: optional(library, SYM_DEVICE_SET_MEM_CLK_VF_OFFSET),
            device_set_gpu_locked_clocks: optional(library, SYM_DEVICE_SET_GPU_LOCKED_CLOCKS),
            device_set_memory_locked_clocks: optional(
                library,
                SYM_DEVICE_SET_MEMORY_LOCKED_CLOCKS,
            ),
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            core_clock_offset: self.device_set_gpc_clk_vf_offset.is_some(),
            memory_clock_offset: self.device_set_mem_clk_vf_offset.is_some(),
            locked_core_clocks: self.device_set_gpu_locked_clocks.is_some(),
            locked_memory_clocks: self.device_set_memory_locked_clocks.is_some(),
            fan_count: self.device_get_num_fans.is_some(),
            fan_speed_query: self.device_get_fan_speed.is_some(),
            fan_control: self.device_set_fan_speed.is_some(),
            default_fan_speed: self.device_set_default_fan_speed.is_some(),
        }
    }
}

fn required<T: Copy>(library: &Library, symbol: &'static str) -> Result<T> {
    // SAFETY: every `T` used with this helper is the nvml.h signature of `symbol`.
    unsafe {
        library
            .get::<T>(symbol.as_bytes())
            .map(|sym| *sym)
            .map_err(|e| TunerError::MissingSymbol {
                symbol,
                reason: e.to_string(),
            })
    }
}

fn optional<T: Copy>(library: &Library, symbol: &'static str) -> Option<T> {
    // SAFETY: see `required`.
    let resolved = unsafe { library.get::<T>(symbol.as_bytes()).map(|sym| *sym).ok() };
    if resolved.is_none() {
        debug!("Optional NVML symbol {} not exported by this driver", symbol);
    }
    resolved
}

// =============================================================================
// NvmlLibrary
// =============================================================================

/// Loaded and initialised NVML. Shuts NVML down when dropped.
pub struct NvmlLibrary {
    api: Api,
    capabilities: Capabilities,
    // Keeps the function pointers in `api` valid; dropped last.
    _library: Library,
}

impl NvmlLibrary {
    /// Load `libnvidia-ml`, resolve its entry points and initialise NVML.
    pub fn load() -> Result<Self> {
        let library = open_library()?;
        let api = Api::resolve(&library)?;
        let capabilities = api.capabilities();

        // Initialise before building Self so a failure never runs the shutdown in Drop.
        // SAFETY: nvmlInit_v2 takes no arguments.
        let ret = unsafe { (api.init)() };
        if ret != NVML_SUCCESS {
            return Err(nvml_error(&api, ret, "initialize NVML"));
        }

        info!("NVML initialized (capabilities: {})", capabilities);
        Ok(Self {
            api,
            capabilities,
            _library: library,
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Installed driver version, e.g. `535.104.05`.
    pub fn driver_version(&self) -> Result<String> {
        let mut buf = [0 as c_char; DRIVER_VERSION_BUFFER_SIZE];
        // SAFETY: buf is writable for its full length, which is passed along.
        let ret = unsafe {
            (self.api.system_get_driver_version)(buf.as_mut_ptr(), buf.len() as c_uint)
        };
        self.check(ret, "get driver version")?;

        // SAFETY: NVML NUL-terminates the version on success.
        let version = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(version.to_string_lossy().into_owned())
    }

    /// Fail unless the installed driver is at least [`MAJOR_MIN_VERSION`].
    ///
    /// Returns the driver major version.
    pub fn check_driver_version(&self) -> Result<u32> {
        let version = self.driver_version()?;
        let major = check_driver_major(&version)?;
        info!("NVIDIA driver version {}", version);
        Ok(major)
    }

    pub(crate) fn api(&self) -> &Api {
        &self.api
    }

    /// Map an NVML return code to a result.
    pub(crate) fn check(&self, ret: NvmlReturn, operation: &str) -> Result<()> {
        if ret == NVML_SUCCESS {
            Ok(())
        } else {
            Err(nvml_error(&self.api, ret, operation))
        }
    }
}

fn nvml_error(api: &Api, ret: NvmlReturn, operation: &str) -> TunerError {
    // SAFETY: nvmlErrorString accepts any code and returns a static string or NULL.
    let message = unsafe {
        let ptr = (api.error_string)(ret);
        if ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    };

    TunerError::Nvml {
        operation: operation.to_string(),
        code: ret,
        message,
    }
}

impl Drop for NvmlLibrary {
    fn drop(&mut self) {
        // SAFETY: NVML was initialised in `load`.
        let ret = unsafe { (self.api.shutdown)() };
        if ret != NVML_SUCCESS {
            warn!("nvmlShutdown returned error code {}", ret);
        } else {
            debug!("NVML shut down");
        }
    }
}

fn open_library() -> Result<Library> {
    let mut reasons = Vec::new();

    for name in LIBRARY_NAMES {
        // SAFETY: libnvidia-ml has no initialisation side effects on load.
        match unsafe { Library::new(name) } {
            Ok(library) => {
                debug!("Loaded {}", name);
                return Ok(library);
            }
            Err(e) => reasons.push(format!("{}: {}", name, e)),
        }
    }

    Err(TunerError::LibraryLoad {
        reason: reasons.join("; "),
    })
}

/// Parse the major number of a driver version string such as `535.104.05`.
pub fn parse_driver_major(version: &str) -> Result<u32> {
    let (major, _) = version
        .trim()
        .split_once('.')
        .ok_or_else(|| TunerError::InvalidDriverVersion(version.to_string()))?;

    major
        .parse()
        .map_err(|_| TunerError::InvalidDriverVersion(version.to_string()))
}

/// Parse `version` and reject drivers older than [`MAJOR_MIN_VERSION`].
pub fn check_driver_major(version: &str) -> Result<u32> {
    let major = parse_driver_major(version)?;
    if major < MAJOR_MIN_VERSION {
        return Err(TunerError::UnsupportedDriver {
            found: major,
            required: MAJOR_MIN_VERSION,
        });
    }
    Ok(major)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver_major() {
        assert_eq!(parse_driver_major("535.104.05").unwrap(), 535);
        assert_eq!(parse_driver_major("520.56").unwrap(), 520);
        assert!(parse_driver_major("garbage").is_err());
        assert!(parse_driver_major("x.1").is_err());
    }

    #[test]
    fn test_check_driver_major() {
        assert_eq!(check_driver_major("550.54.14").unwrap(), 550);
        assert!(matches!(
            check_driver_major("515.65.01"),
            Err(TunerError::UnsupportedDriver {
                found: 515,
                required: 520
            })
        ));
    }

    #[test]
    fn test_capabilities_display() {
        assert_eq!(Capabilities::default().to_string(), "none");

        let caps = Capabilities {
            fan_control: true,
            default_fan_speed: true,
            ..Capabilities::default()
        };
        assert_eq!(caps.to_string(), "fan-control, default-fan-speed");
    }
}
