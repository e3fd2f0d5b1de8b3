// src/hal/types.rs
//! Core types for analog input device abstraction

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Input range of one analog channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRange {
    /// ±25 V, low gain
    PlusMinus25V,
    /// ±2.5 V, high gain
    PlusMinus2_5V,
}

impl InputRange {
    /// Full-scale amplitude in volts
    pub fn full_scale_volts(self) -> f64 {
        match self {
            InputRange::PlusMinus25V => 25.0,
            InputRange::PlusMinus2_5V => 2.5,
        }
    }
}

impl Default for InputRange {
    fn default() -> Self {
        InputRange::PlusMinus25V
    }
}

/// Analog trigger condition evaluated per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    RisingEdge,
    FallingEdge,
    LowLevel,
    HighLevel,
}

/// How the per-channel analog trigger is combined with other sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Free running, the trigger never gates acquisition
    Always,
    Analog,
    External,
    DigitalOrAnalog,
    DigitalAndAnalog,
    DigitalXorAnalog,
}

/// Shared trigger source selector for the whole analog input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Channel1,
    Channel2,
    Channel1OrChannel2,
    Channel1AndChannel2,
    Channel1XorChannel2,
    DigitalIn,
}

impl Default for TriggerSource {
    fn default() -> Self {
        TriggerSource::Channel1
    }
}

/// Trigger settings for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelTrigger {
    pub condition: TriggerCondition,
    pub mode: TriggerMode,
    /// Trigger level in volts
    pub level: f64,
}

impl Default for ChannelTrigger {
    fn default() -> Self {
        Self {
            condition: TriggerCondition::RisingEdge,
            mode: TriggerMode::Always,
            level: 0.0,
        }
    }
}

/// Ordered set of channel activation flags, fixed for a source's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSelection(Vec<bool>);

impl ChannelSelection {
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Number of physical channel slots described
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_active(&self, channel: usize) -> bool {
        self.0.get(channel).copied().unwrap_or(false)
    }

    /// Number of active channels, equal to the number of output streams
    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|&&enabled| enabled).count()
    }

    /// Physical indices of the active channels, in channel order.
    ///
    /// Output stream `i` is fed by `active_channels()[i]`.
    pub fn active_channels(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(index, &enabled)| enabled.then_some(index))
            .collect()
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self(vec![true, true])
    }
}

impl From<Vec<bool>> for ChannelSelection {
    fn from(flags: Vec<bool>) -> Self {
        Self(flags)
    }
}

/// Cancellation flag owned by one fetching client of a shared device.
///
/// Clones share the flag. Cancelling one client's token never interrupts
/// another client's fetch on the same handle.
#[derive(Debug, Clone, Default)]
pub struct FetchCancel(Arc<AtomicBool>);

impl FetchCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Arm the flag; called by device implementations in `cancel_fetch`
    pub fn arm(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.0.store(false, Ordering::Release);
    }
}
