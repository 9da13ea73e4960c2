//! NVIDIA Tuner CLI
//!
//! Command-line interface for overclocking, power limiting and fan control of
//! NVIDIA GPUs.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use nvidia_tuner::config::{ControlMode, SettingsOverrides, TunerSettings};
use nvidia_tuner::cooling::ControlLoop;
use nvidia_tuner::device::{NvmlDevice, NvmlLibrary};
use nvidia_tuner::logging;
use nvidia_tuner::shutdown::{FanRestoreGuard, ShutdownSignal};
use nvidia_tuner::storage;
use nvidia_tuner::utils::ensure_root;
use nvidia_tuner::utils::parsing::{
    parse_fan_speed, parse_hysteresis, parse_integral_gain, parse_pairs, parse_proportional_gain,
    parse_target_temperature, parse_update_period,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NVIDIA GPU tuning and fan control tool
#[derive(Parser, Debug)]
#[command(name = "nvidia-tuner")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GPU index
    #[arg(short = 'g', long)]
    gpu_index: Option<u32>,

    /// Core clock offset (MHz)
    #[arg(short = 'c', long, allow_hyphen_values = true)]
    core_clock_offset: Option<i32>,

    /// Memory clock offset (MHz)
    #[arg(short = 'm', long, allow_hyphen_values = true)]
    memory_clock_offset: Option<i32>,

    /// Max core clock (MHz)
    #[arg(short = 'C', long)]
    max_core_clock: Option<u32>,

    /// Max memory clock (MHz)
    #[arg(short = 'M', long)]
    max_memory_clock: Option<u32>,

    /// Power limit (W)
    #[arg(short = 'l', long)]
    power_limit: Option<u32>,

    /// Target temperature for PI fan control (30-90°C)
    #[arg(short = 't', long, value_parser = parse_target_temperature, conflicts_with = "pairs")]
    target_temperature: Option<f32>,

    /// Fan curve as temperature:fan speed pairs, e.g. "40:30,60:50,80:100"
    #[arg(short = 'P', long, value_parser = parse_pairs)]
    pairs: Option<String>,

    /// Fan speed update period (1-10 s)
    #[arg(short = 'f', long, value_parser = parse_update_period)]
    fan_speed_update_period: Option<u32>,

    /// Fan curve temperature hysteresis (°C)
    #[arg(short = 'H', long, value_parser = parse_hysteresis)]
    temperature_hysteresis: Option<u32>,

    /// Proportional gain for PI control (0.1-10)
    #[arg(short = 'p', long, value_parser = parse_proportional_gain)]
    proportional_gain: Option<f32>,

    /// Integral gain for PI control (0 or 0.01-1)
    #[arg(short = 'i', long, value_parser = parse_integral_gain)]
    integral_gain: Option<f32>,

    /// Lowest fan speed used by PI control (%)
    #[arg(long, value_parser = parse_fan_speed)]
    min_fan_speed: Option<u32>,

    /// Highest fan speed used by PI control (%)
    #[arg(long, value_parser = parse_fan_speed)]
    max_fan_speed: Option<u32>,

    /// Settings file [default: <config dir>/nvidia-tuner/config.json]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the resolved settings back to the settings file
    #[arg(long)]
    save: bool,

    /// Log filter, e.g. "debug" [env: NVIDIA_TUNER_LOG] [default: info]
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            gpu_index: self.gpu_index,
            core_clock_offset: self.core_clock_offset,
            memory_clock_offset: self.memory_clock_offset,
            max_core_clock: self.max_core_clock,
            max_memory_clock: self.max_memory_clock,
            power_limit: self.power_limit,
            target_temperature: self.target_temperature,
            pairs: self.pairs.clone(),
            fan_speed_update_period: self.fan_speed_update_period,
            temperature_hysteresis: self.temperature_hysteresis,
            proportional_gain: self.proportional_gain,
            integral_gain: self.integral_gain,
            min_fan_speed: self.min_fan_speed,
            max_fan_speed: self.max_fan_speed,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_level.as_deref());

    ensure_root().context("Failed to obtain root privileges")?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_path()?,
    };
    let stored = storage::load_settings(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    let overrides = args.overrides();
    let settings = overrides.resolve(&stored).context("Invalid settings")?;

    if args.save {
        storage::save_settings(&config_path, &overrides.apply_to(&stored))
            .context("Failed to save settings")?;
        println!("💾 Settings saved to {}", config_path.display());
    }

    run(&settings)
}

// =============================================================================
// Command Implementation
// =============================================================================

fn run(settings: &TunerSettings) -> Result<()> {
    let nvml = NvmlLibrary::load().context("Failed to load NVML")?;
    let driver = nvml.check_driver_version()?;
    println!("✅ NVIDIA driver v{} ({})", driver, nvml.capabilities());

    let gpu = NvmlDevice::open(&nvml, settings.gpu_index)
        .with_context(|| format!("Failed to open GPU {}", settings.gpu_index))?;

    if settings.has_device_tuning() {
        apply_tuning(&gpu, settings)?;
    }

    if matches!(settings.mode, ControlMode::None) {
        println!("ℹ️  No fan control mode selected, exiting.");
        return Ok(());
    }

    gpu.require_fan_control()?;

    let shutdown = ShutdownSignal::install()?;
    let guard = FanRestoreGuard::new(&gpu);

    println!(
        "🌀 {} fan control on GPU {} ({} fan(s), every {}s). Ctrl+C to stop.",
        settings.mode,
        gpu.index(),
        gpu.fan_count(),
        settings.update_period
    );

    let period = Duration::from_secs(u64::from(settings.update_period));
    let cycles = ControlLoop::new(&gpu, &shutdown, period)
        .run(&settings.mode)
        .context("Fan control failed")?;

    guard
        .finish()
        .context("Failed to restore default fan speed")?;
    println!("\n👋 Stopped after {} cycles, default fan control restored.", cycles);

    Ok(())
}

fn apply_tuning(gpu: &NvmlDevice<'_>, settings: &TunerSettings) -> Result<()> {
    if let Some(offset) = settings.core_clock_offset {
        gpu.set_core_clock_offset(offset)?;
        println!("✅ Core clock offset: {} MHz", offset);
    }
    if let Some(offset) = settings.memory_clock_offset {
        gpu.set_memory_clock_offset(offset)?;
        println!("✅ Memory clock offset: {} MHz", offset);
    }
    if let Some(clock) = settings.max_core_clock {
        gpu.set_max_core_clock(clock)?;
        println!("✅ Max core clock: {} MHz", clock);
    }
    if let Some(clock) = settings.max_memory_clock {
        gpu.set_max_memory_clock(clock)?;
        println!("✅ Max memory clock: {} MHz", clock);
    }
    if let Some(watts) = settings.power_limit {
        gpu.set_power_limit(watts)?;
        println!("✅ Power limit: {} W", watts);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_modes_conflict() {
        let result = Args::try_parse_from(["nvidia-tuner", "-t", "65", "-P", "40:30,80:100"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_map_to_overrides() {
        let args = Args::try_parse_from([
            "nvidia-tuner", "-g", "1", "-c", "-100", "-l", "250", "-P", "40:30,80:100", "-H", "3",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.gpu_index, Some(1));
        assert_eq!(overrides.core_clock_offset, Some(-100));
        assert_eq!(overrides.power_limit, Some(250));
        assert_eq!(overrides.pairs.as_deref(), Some("40:30,80:100"));
        assert_eq!(overrides.temperature_hysteresis, Some(3));
        assert_eq!(overrides.target_temperature, None);
    }

    #[test]
    fn test_invalid_values_rejected_by_parser() {
        assert!(Args::try_parse_from(["nvidia-tuner", "-t", "95"]).is_err());
        assert!(Args::try_parse_from(["nvidia-tuner", "-f", "0"]).is_err());
        assert!(Args::try_parse_from(["nvidia-tuner", "-P", "40-30"]).is_err());
    }
}
