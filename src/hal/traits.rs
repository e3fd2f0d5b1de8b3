// src/hal/traits.rs
//! Core HAL traits for analog input device abstraction

use crate::hal::types::{FetchCancel, InputRange, TriggerCondition, TriggerMode, TriggerSource};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by device implementations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("open failed: {0}")]
    OpenFailed(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// The caller's fetch was interrupted through its cancel token
    #[error("fetch cancelled")]
    Cancelled,
    #[error("configuration rejected: {0}")]
    Configuration(String),
    #[error("invalid channel {channel} (device has {available})")]
    InvalidChannel { channel: usize, available: usize },
}

/// One open analog input device.
///
/// Handles are shared between every source using the same URI, so all
/// methods take `&self` and implementations synchronize internally.
pub trait AnalogInDevice: Send + Sync {
    /// Connection URI identifying the device
    fn uri(&self) -> &str;

    /// Number of physical analog channels
    fn channel_count(&self) -> usize;

    /// Depth of the device-side buffer queue
    fn set_kernel_buffers_count(&self, count: u32) -> Result<(), DeviceError>;

    fn enable_channel(&self, channel: usize, enabled: bool) -> Result<(), DeviceError>;

    fn set_range(&self, channel: usize, range: InputRange) -> Result<(), DeviceError>;

    fn set_sample_rate(&self, rate_hz: f64) -> Result<(), DeviceError>;

    fn set_oversampling_ratio(&self, ratio: u32) -> Result<(), DeviceError>;

    fn set_trigger_condition(
        &self,
        channel: usize,
        condition: TriggerCondition,
    ) -> Result<(), DeviceError>;

    fn set_trigger_mode(&self, channel: usize, mode: TriggerMode) -> Result<(), DeviceError>;

    fn set_trigger_level(&self, channel: usize, level_volts: f64) -> Result<(), DeviceError>;

    fn set_trigger_source(&self, source: TriggerSource) -> Result<(), DeviceError>;

    /// Trigger delay in samples, negative values capture pre-trigger data
    fn set_trigger_delay(&self, delay: i32) -> Result<(), DeviceError>;

    /// Run one ADC calibration pass. Affects the whole device.
    fn calibrate_adc(&self) -> Result<(), DeviceError>;

    /// Blocking fetch of `block_size` raw samples for `channels`.
    ///
    /// Returns one sequence per requested physical channel, in the order
    /// given, regardless of what other users of the handle have enabled.
    /// May block for a hardware-determined duration; cancelling `cancel`
    /// through `cancel_fetch` must unblock it.
    fn fetch_block(
        &self,
        channels: &[usize],
        block_size: usize,
        cancel: &FetchCancel,
    ) -> Result<Vec<Vec<f64>>, DeviceError>;

    /// Interrupt the fetch owned by `cancel`.
    ///
    /// Only fetches carrying this token return `DeviceError::Cancelled`.
    /// The token stays armed until `flush_residual`, so a fetch that starts
    /// after the cancel is interrupted too.
    fn cancel_fetch(&self, cancel: &FetchCancel);

    /// Drop residual data of the cancelled fetch and disarm `cancel`
    fn flush_residual(&self, cancel: &FetchCancel);

    /// Convert a raw code of `channel` to volts using the current range and calibration
    fn convert_raw_to_volts(&self, channel: usize, raw: f64) -> f64;
}

/// Opens and closes device handles. Used by the context registry.
pub trait DeviceConnector: Send + Sync {
    fn open(&self, uri: &str) -> Result<Arc<dyn AnalogInDevice>, DeviceError>;

    /// Release the connection behind `device`. Called once, after the last
    /// registry reference is gone.
    fn close(&self, device: &dyn AnalogInDevice);
}
