//! Raw NVML types, constants and entry point signatures.
//!
//! Only the subset used by the tuner is declared. Signatures follow `nvml.h`.

use std::ffi::{c_char, c_int, c_uint, c_void};

// =============================================================================
// Types
// =============================================================================

/// `nvmlReturn_t`
pub type NvmlReturn = c_uint;

/// `nvmlDevice_t`, an opaque pointer owned by the driver.
pub type NvmlDeviceHandle = *mut c_void;

// =============================================================================
// Constants
// =============================================================================

/// Shared objects tried in order.
pub const LIBRARY_NAMES: [&str; 2] = ["libnvidia-ml.so.1", "libnvidia-ml.so"];

pub const NVML_SUCCESS: NvmlReturn = 0;

/// `NVML_TEMPERATURE_GPU`
pub const NVML_TEMPERATURE_GPU: c_uint = 0;

/// `NVML_SYSTEM_DRIVER_VERSION_BUFFER_SIZE`
pub const DRIVER_VERSION_BUFFER_SIZE: usize = 80;

// =============================================================================
// Entry Points
// =============================================================================

pub type InitFn = unsafe extern "C" fn() -> NvmlReturn;
pub type ShutdownFn = unsafe extern "C" fn() -> NvmlReturn;
pub type ErrorStringFn = unsafe extern "C" fn(NvmlReturn) -> *const c_char;
pub type SystemGetDriverVersionFn = unsafe extern "C" fn(*mut c_char, c_uint) -> NvmlReturn;
pub type DeviceGetHandleByIndexFn =
    unsafe extern "C" fn(c_uint, *mut NvmlDeviceHandle) -> NvmlReturn;
pub type DeviceGetTemperatureFn =
    unsafe extern "C" fn(NvmlDeviceHandle, c_uint, *mut c_uint) -> NvmlReturn;
pub type DeviceSetPowerManagementLimitFn =
    unsafe extern "C" fn(NvmlDeviceHandle, c_uint) -> NvmlReturn;
pub type DeviceGetNumFansFn = unsafe extern "C" fn(NvmlDeviceHandle, *mut c_uint) -> NvmlReturn;
pub type DeviceGetFanSpeedFn =
    unsafe extern "C" fn(NvmlDeviceHandle, c_uint, *mut c_uint) -> NvmlReturn;
pub type DeviceSetFanSpeedFn = unsafe extern "C" fn(NvmlDeviceHandle, c_uint, c_uint) -> NvmlReturn;
pub type DeviceSetDefaultFanSpeedFn = unsafe extern "C" fn(NvmlDeviceHandle, c_uint) -> NvmlReturn;
pub type DeviceSetClkVfOffsetFn = unsafe extern "C" fn(NvmlDeviceHandle, c_int) -> NvmlReturn;
/// Shared by `nvmlDeviceSetGpuLockedClocks` and `nvmlDeviceSetMemoryLockedClocks`.
pub type DeviceSetLockedClocksFn =
    unsafe extern "C" fn(NvmlDeviceHandle, c_uint, c_uint) -> NvmlReturn;

// Mandatory
pub const SYM_INIT: &str = "nvmlInit_v2";
pub const SYM_SHUTDOWN: &str = "nvmlShutdown";
pub const SYM_ERROR_STRING: &str = "nvmlErrorString";
pub const SYM_SYSTEM_GET_DRIVER_VERSION: &str = "nvmlSystemGetDriverVersion";
pub const SYM_DEVICE_GET_HANDLE_BY_INDEX: &str = "nvmlDeviceGetHandleByIndex_v2";
pub const SYM_DEVICE_GET_TEMPERATURE: &str = "nvmlDeviceGetTemperature";
pub const SYM_DEVICE_SET_POWER_MANAGEMENT_LIMIT: &str = "nvmlDeviceSetPowerManagementLimit";

// Optional, depending on driver branch
pub const SYM_DEVICE_GET_NUM_FANS: &str = "nvmlDeviceGetNumFans";
pub const SYM_DEVICE_GET_FAN_SPEED: &str = "nvmlDeviceGetFanSpeed_v2";
pub const SYM_DEVICE_SET_FAN_SPEED: &str = "nvmlDeviceSetFanSpeed_v2";
pub const SYM_DEVICE_SET_DEFAULT_FAN_SPEED: &str = "nvmlDeviceSetDefaultFanSpeed_v2";
pub const SYM_DEVICE_SET_GPC_CLK_VF_OFFSET: &str = "nvmlDeviceSetGpcClkVfOffset";
pub const SYM_DEVICE_SET_MEM_CLK_VF_OFFSET: &str = "nvmlDeviceSetMemClkVfOffset";
pub const SYM_DEVICE_SET_GPU_LOCKED_CLOCKS: &str = "nvmlDeviceSetGpuLockedClocks";
pub const SYM_DEVICE_SET_MEMORY_LOCKED_CLOCKS: &str = "nvmlDeviceSetMemoryLockedClocks";
