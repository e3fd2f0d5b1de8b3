// src/config/mod.rs
//! Source configuration with defaults and validation

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use crate::acquisition::OutputMode;
use crate::hal::{ChannelSelection, ChannelTrigger, InputRange, TriggerSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction-time configuration of one analog input source.
///
/// Immutable once the source is built; there is no reconfiguration while
/// streaming.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    #[serde(default = "defaults::uri")]
    pub uri: String,

    /// Samples per channel requested from the device per fetch
    #[serde(default = "defaults::block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub channels: ChannelSelection,

    /// Input range per physical channel
    #[serde(default = "defaults::ranges")]
    pub ranges: Vec<InputRange>,

    #[serde(default = "defaults::sample_rate_hz")]
    pub sample_rate_hz: f64,

    #[serde(default = "defaults::oversampling_ratio")]
    pub oversampling_ratio: u32,

    /// Device-side buffer queue depth hint
    #[serde(default = "defaults::kernel_buffers")]
    pub kernel_buffers: u32,

    #[serde(default)]
    pub calibrate_adc: bool,

    #[serde(default)]
    pub output_mode: OutputMode,

    /// Trigger settings per physical channel
    #[serde(default = "defaults::triggers")]
    pub triggers: Vec<ChannelTrigger>,

    #[serde(default)]
    pub trigger_source: TriggerSource,

    #[serde(default)]
    pub trigger_delay: i32,

    #[serde(default)]
    pub wait: WaitConfig,

    /// Capacity of the side notification channel
    #[serde(default = "defaults::notification_capacity")]
    pub notification_capacity: usize,
}

/// Streaming task wait behaviour
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WaitConfig {
    /// Length of one bounded wait interval
    #[serde(default = "defaults::wait_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub policy: WaitPolicy,
}

/// What `work` does when a refill does not arrive within one interval
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Return zero items after `max_timeouts` elapsed intervals
    Bounded { max_timeouts: u32 },
    /// Keep waiting, reporting one timeout per interval, until data or stop
    UntilData,
}

impl WaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use crate::hal::{ChannelTrigger, InputRange};

    pub fn uri() -> String { device::DEFAULT_URI.to_string() }
    pub fn block_size() -> usize { streaming::DEFAULT_BLOCK_SIZE }
    pub fn ranges() -> Vec<InputRange> { vec![InputRange::default(); device::DEFAULT_CHANNEL_COUNT] }
    pub fn sample_rate_hz() -> f64 { device::DEFAULT_SAMPLE_RATE_HZ }
    pub fn oversampling_ratio() -> u32 { device::DEFAULT_OVERSAMPLING_RATIO }
    pub fn kernel_buffers() -> u32 { device::DEFAULT_KERNEL_BUFFERS }
    pub fn triggers() -> Vec<ChannelTrigger> { vec![ChannelTrigger::default(); device::DEFAULT_CHANNEL_COUNT] }
    pub fn notification_capacity() -> usize { streaming::DEFAULT_NOTIFICATION_CAPACITY }

    pub fn wait_timeout_ms() -> u64 { streaming::DEFAULT_WAIT_TIMEOUT_MS }
    pub fn max_timeouts() -> u32 { streaming::DEFAULT_MAX_TIMEOUTS_PER_CALL }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy::Bounded {
            max_timeouts: defaults::max_timeouts(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::wait_timeout_ms(),
            policy: WaitPolicy::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: defaults::uri(),
            block_size: defaults::block_size(),
            channels: ChannelSelection::default(),
            ranges: defaults::ranges(),
            sample_rate_hz: defaults::sample_rate_hz(),
            oversampling_ratio: defaults::oversampling_ratio(),
            kernel_buffers: defaults::kernel_buffers(),
            calibrate_adc: false,
            output_mode: OutputMode::default(),
            triggers: defaults::triggers(),
            trigger_source: TriggerSource::default(),
            trigger_delay: 0,
            wait: WaitConfig::default(),
            notification_capacity: defaults::notification_capacity(),
        }
    }
}

impl SourceConfig {
    /// Check internal consistency, reporting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.uri.trim().is_empty() {
            errors.push("device uri cannot be empty".to_string());
        }

        if self.block_size == 0 || self.block_size > streaming::MAX_BLOCK_SIZE {
            errors.push(format!(
                "block size {} outside [1, {}]",
                self.block_size,
                streaming::MAX_BLOCK_SIZE
            ));
        }

        if self.channels.active_count() == 0 {
            errors.push("at least one channel must be selected".to_string());
        }

        // Per-channel tables only need to cover the selected channels
        if let Some(&last) = self.channels.active_channels().last() {
            if self.ranges.len() <= last {
                errors.push(format!(
                    "range table has {} entries, channel {} is selected",
                    self.ranges.len(),
                    last
                ));
            }
            if self.triggers.len() <= last {
                errors.push(format!(
                    "trigger table has {} entries, channel {} is selected",
                    self.triggers.len(),
                    last
                ));
            }
        }

        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            errors.push(format!("sample rate {} Hz must be positive", self.sample_rate_hz));
        }

        if self.oversampling_ratio == 0 {
            errors.push("oversampling ratio must be greater than 0".to_string());
        }

        if self.kernel_buffers == 0 {
            errors.push("kernel buffer count must be greater than 0".to_string());
        }

        if self.wait.timeout_ms == 0 {
            errors.push("wait timeout must be greater than 0 ms".to_string());
        }

        if let WaitPolicy::Bounded { max_timeouts: 0 } = self.wait.policy {
            errors.push("bounded wait policy needs at least one timeout interval".to_string());
        }

        if self.notification_capacity == 0 {
            errors.push("notification capacity must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Number of output streams the source produces
    pub fn output_count(&self) -> usize {
        self.channels.active_count()
    }

    /// Time the device needs to fill one block at the configured rate
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate_hz)
    }
}
