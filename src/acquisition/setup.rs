// src/acquisition/setup.rs
//! One-shot device configuration applied when a source is built

use crate::config::SourceConfig;
use crate::hal::{AnalogInDevice, DeviceError};
use tracing::debug;

/// Enable the selected channels and apply ranges, rate and oversampling.
///
/// Unselected channels are left untouched; another source sharing the
/// device may own them.
pub fn apply_acquisition_settings(device: &dyn AnalogInDevice, config: &SourceConfig) -> Result<(), DeviceError> {
    device.set_kernel_buffers_count(config.kernel_buffers)?;

    for channel in config.channels.active_channels() {
        device.enable_channel(channel, true)?;
        device.set_range(channel, config.ranges[channel])?;
    }

    device.set_sample_rate(config.sample_rate_hz)?;
    device.set_oversampling_ratio(config.oversampling_ratio)?;

    debug!(
        uri = device.uri(),
        channels = ?config.channels.active_channels(),
        sample_rate_hz = config.sample_rate_hz,
        oversampling_ratio = config.oversampling_ratio,
        "acquisition settings applied"
    );
    Ok(())
}

/// Apply per-channel trigger condition, mode and level, then the shared source and delay
pub fn apply_trigger_settings(device: &dyn AnalogInDevice, config: &SourceConfig) -> Result<(), DeviceError> {
    for channel in config.channels.active_channels() {
        let trigger = &config.triggers[channel];
        device.set_trigger_condition(channel, trigger.condition)?;
        device.set_trigger_mode(channel, trigger.mode)?;
        device.set_trigger_level(channel, trigger.level)?;
    }

    device.set_trigger_source(config.trigger_source)?;
    device.set_trigger_delay(config.trigger_delay)?;
    Ok(())
}

/// Full construction-time configuration, including the optional calibration pass
pub fn configure_device(device: &dyn AnalogInDevice, config: &SourceConfig) -> Result<(), DeviceError> {
    apply_acquisition_settings(device, config)?;
    apply_trigger_settings(device, config)?;

    if config.calibrate_adc {
        debug!(uri = device.uri(), "calibrating ADC");
        device.calibrate_adc()?;
    }
    Ok(())
}
