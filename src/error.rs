//! Custom error types for the tuner.
//!
//! Configuration problems are grouped in [`ConfigError`] and are always
//! detected before a control loop starts. Everything else (driver, device,
//! sensor, environment) is a variant of [`TunerError`].

use thiserror::Error;

/// Invalid user-supplied configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Gain value out of its valid range.
    #[error("{name} gain {value} is invalid. Valid range: {min}-{max}")]
    InvalidGain {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// Fan speed update period out of range.
    #[error("Fan speed update period must be between {min} and {max} seconds, got {value}")]
    InvalidUpdatePeriod { value: f32, min: u32, max: u32 },

    /// Target temperature out of range.
    #[error("Target temperature must be between {min}°C and {max}°C, got {value}°C")]
    InvalidTargetTemperature { value: f32, min: f32, max: f32 },

    /// Hysteresis band larger than the temperature scale.
    #[error("Temperature hysteresis {value}°C exceeds limit of {max}°C")]
    InvalidHysteresis { value: u32, max: u32 },

    /// Controller output range is empty or exceeds 100%.
    #[error("Invalid fan speed range {min}%-{max}%. Expected min <= max <= {limit}%")]
    InvalidFanSpeedRange { min: u32, max: u32, limit: u32 },

    /// A `temperature:fan_speed` token could not be parsed.
    #[error("Invalid temperature and fan speed pair format: '{0}'")]
    MalformedPair(String),

    /// Fan curve without any point.
    #[error("No temperature fan speed pair provided")]
    EmptyCurve,

    /// Curve temperature above the sensor scale.
    #[error("Temperature within pairs exceeds limit of {max}°C: {value}°C")]
    TemperatureOutOfRange { value: u32, max: u32 },

    /// Curve fan speed above 100%.
    #[error("Fan speed within pairs exceeds limit of {max}%: {value}%")]
    FanSpeedOutOfRange { value: u32, max: u32 },

    /// Curve temperatures must strictly increase.
    #[error("Temperature is not increasing at pair {index} ({previous}°C -> {current}°C)")]
    TemperatureNotIncreasing {
        index: usize,
        previous: u32,
        current: u32,
    },

    /// Curve fan speeds must never decrease.
    #[error("Fan speed is decreasing at pair {index} ({previous}% -> {current}%)")]
    FanSpeedDecreasing {
        index: usize,
        previous: u32,
        current: u32,
    },

    /// Power limit too large to express in milliwatts.
    #[error("Power limit {value} W is out of range")]
    InvalidPowerLimit { value: u32 },

    /// Both PI control and a fan curve were requested.
    #[error("Target temperature and temperature/fan speed pairs are mutually exclusive")]
    ConflictingModes,
}

/// Main error type for tuner operations.
#[derive(Error, Debug)]
pub enum TunerError {
    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sensor reading outside of the valid temperature scale.
    #[error("Temperature reading {value}°C is outside of the valid range 0-{max}°C")]
    SensorRange { value: u32, max: u32 },

    /// The NVML shared library could not be opened.
    #[error("Failed to load NVML: {reason}")]
    LibraryLoad { reason: String },

    /// A mandatory NVML entry point is missing.
    #[error("NVML symbol {symbol} not found: {reason}")]
    MissingSymbol { symbol: &'static str, reason: String },

    /// An NVML call returned a non-success code.
    #[error("Failed to {operation}: {message} (Error code: {code})")]
    Nvml {
        operation: String,
        code: u32,
        message: String,
    },

    /// The loaded driver does not export the entry point for this feature.
    #[error("{feature} is not available in your NVML version")]
    Unsupported { feature: &'static str },

    /// Driver too old.
    #[error("Your driver version v{found} is not supported. Driver version v{required} or newer is required.")]
    UnsupportedDriver { found: u32, required: u32 },

    /// Driver version string could not be parsed.
    #[error("Failed to parse driver version: {0}")]
    InvalidDriverVersion(String),

    /// Not running as root and no way to escalate.
    #[error("Root privileges are required to run this command.")]
    PrivilegesRequired,

    /// Settings file could not be read or written.
    #[error("Settings storage error: {0}")]
    Storage(String),

    /// Signal handler installation failed.
    #[error("Failed to install signal handler: {0}")]
    Signal(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for tuner operations.
pub type Result<T> = std::result::Result<T, TunerError>;
