// src/hal/simulator.rs
//! Deterministic analog input simulator
//!
//! Produces integral ADC codes from a configurable pattern so tests can
//! predict every sample a source emits. Fault injection covers the cases the
//! buffering engine has to survive: failing fetches, fetches that hang until
//! cancelled, and slow fetches.

use crate::config::constants::{device, simulation};
use crate::hal::{
    AnalogInDevice, ChannelTrigger, DeviceConnector, DeviceError, FetchCancel, InputRange,
    TriggerCondition, TriggerMode, TriggerSource,
};
use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Waveform generated by the simulator, in ADC codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Sawtooth over the full code span, each channel shifted by `channel_offset`
    Ramp { channel_offset: u32 },
    Sine { period_samples: u32, amplitude_codes: f64 },
    Constant { code: f64 },
}

impl SignalPattern {
    /// Noise-free code of `channel` at absolute sample `index`
    pub fn code(&self, channel: usize, index: u64) -> f64 {
        match self {
            SignalPattern::Ramp { channel_offset } => {
                let span = device::ADC_CODE_SPAN;
                let shifted = index + (*channel_offset as u64) * channel as u64;
                (shifted % span) as f64 - (span / 2) as f64
            }
            SignalPattern::Sine {
                period_samples,
                amplitude_codes,
            } => {
                let period = (*period_samples).max(1) as f64;
                let phase = 2.0 * std::f64::consts::PI * (index as f64 / period)
                    + channel as f64 * std::f64::consts::FRAC_PI_2;
                (amplitude_codes * phase.sin()).round()
            }
            SignalPattern::Constant { code } => *code,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub channel_count: usize,
    pub pattern: SignalPattern,
    /// Peak uniform noise added to every code, 0 disables noise
    pub noise_codes: u16,
    pub seed: u64,
    /// Simulated acquisition time of one block
    pub fetch_latency_ms: u64,
    /// Fail every fetch after this many successful blocks
    pub fail_after_blocks: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            channel_count: device::DEFAULT_CHANNEL_COUNT,
            pattern: SignalPattern::Ramp {
                channel_offset: simulation::DEFAULT_RAMP_CHANNEL_OFFSET,
            },
            noise_codes: 0,
            seed: simulation::DEFAULT_SEED,
            fetch_latency_ms: 0,
            fail_after_blocks: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.channel_count == 0 {
            return Err(DeviceError::Configuration(
                "simulator channel count must be greater than 0".to_string(),
            ));
        }
        if let SignalPattern::Sine { period_samples: 0, .. } = self.pattern {
            return Err(DeviceError::Configuration(
                "sine period must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of everything configured on a simulated device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub kernel_buffers: u32,
    pub enabled: Vec<bool>,
    pub ranges: Vec<InputRange>,
    pub sample_rate_hz: f64,
    pub oversampling_ratio: u32,
    pub triggers: Vec<ChannelTrigger>,
    pub trigger_source: TriggerSource,
    pub trigger_delay: i32,
    pub calibrations: u32,
    pub flushes: u32,
}

impl DeviceSettings {
    fn new(channel_count: usize) -> Self {
        Self {
            kernel_buffers: device::DEFAULT_KERNEL_BUFFERS,
            enabled: vec![false; channel_count],
            ranges: vec![InputRange::default(); channel_count],
            sample_rate_hz: device::DEFAULT_SAMPLE_RATE_HZ,
            oversampling_ratio: 1,
            triggers: vec![ChannelTrigger::default(); channel_count],
            trigger_source: TriggerSource::default(),
            trigger_delay: 0,
            calibrations: 0,
            flushes: 0,
        }
    }
}

struct AcquisitionState {
    next_index: u64,
    rng: StdRng,
    hanging: bool,
    fail_next: bool,
    in_flight: usize,
}

/// In-process analog input device
pub struct SimulatedAnalogIn {
    uri: String,
    config: SimulatorConfig,
    settings: Mutex<DeviceSettings>,
    acquisition: Mutex<AcquisitionState>,
    wake: Condvar,
    blocks_fetched: AtomicU64,
}

impl SimulatedAnalogIn {
    pub fn new(uri: &str, config: SimulatorConfig) -> Result<Self, DeviceError> {
        config.validate()?;

        Ok(Self {
            uri: uri.to_string(),
            settings: Mutex::new(DeviceSettings::new(config.channel_count)),
            acquisition: Mutex::new(AcquisitionState {
                next_index: 0,
                rng: StdRng::seed_from_u64(config.seed),
                hanging: false,
                fail_next: false,
                in_flight: 0,
            }),
            wake: Condvar::new(),
            blocks_fetched: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn settings(&self) -> DeviceSettings {
        self.settings.lock().clone()
    }

    /// Number of blocks delivered successfully
    pub fn blocks_fetched(&self) -> u64 {
        self.blocks_fetched.load(Ordering::Relaxed)
    }

    /// Number of fetches currently blocked inside the device
    pub fn fetches_in_flight(&self) -> usize {
        self.acquisition.lock().in_flight
    }

    /// Make fetches block until cancelled (`true`) or resume delivering (`false`)
    pub fn set_hanging(&self, hanging: bool) {
        self.acquisition.lock().hanging = hanging;
        self.wake.notify_all();
    }

    /// Fail the next fetch once
    pub fn fail_next_fetch(&self) {
        self.acquisition.lock().fail_next = true;
    }

    fn check_channel(&self, channel: usize) -> Result<(), DeviceError> {
        if channel >= self.config.channel_count {
            return Err(DeviceError::InvalidChannel {
                channel,
                available: self.config.channel_count,
            });
        }
        Ok(())
    }

    fn generate(&self, acquisition: &mut AcquisitionState, channels: &[usize], block_size: usize) -> Vec<Vec<f64>> {
        let start = acquisition.next_index;
        let noise = self.config.noise_codes as i32;

        let block = channels
            .iter()
            .map(|&channel| {
                (0..block_size as u64)
                    .map(|offset| {
                        let code = self.config.pattern.code(channel, start + offset);
                        if noise > 0 {
                            code + acquisition.rng.gen_range(-noise..=noise) as f64
                        } else {
                            code
                        }
                    })
                    .collect()
            })
            .collect();

        acquisition.next_index += block_size as u64;
        block
    }
}

impl AnalogInDevice for SimulatedAnalogIn {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn channel_count(&self) -> usize {
        self.config.channel_count
    }

    fn set_kernel_buffers_count(&self, count: u32) -> Result<(), DeviceError> {
        if count == 0 {
            return Err(DeviceError::Configuration(
                "kernel buffer count must be greater than 0".to_string(),
            ));
        }
        self.settings.lock().kernel_buffers = count;
        Ok(())
    }

    fn enable_channel(&self, channel: usize, enabled: bool) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.settings.lock().enabled[channel] = enabled;
        Ok(())
    }

    fn set_range(&self, channel: usize, range: InputRange) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.settings.lock().ranges[channel] = range;
        Ok(())
    }

    fn set_sample_rate(&self, rate_hz: f64) -> Result<(), DeviceError> {
        if !(rate_hz > 0.0 && rate_hz <= device::MAX_SAMPLE_RATE_HZ) {
            return Err(DeviceError::Configuration(format!(
                "unsupported sample rate {} Hz",
                rate_hz
            )));
        }
        self.settings.lock().sample_rate_hz = rate_hz;
        Ok(())
    }

    fn set_oversampling_ratio(&self, ratio: u32) -> Result<(), DeviceError> {
        if ratio == 0 {
            return Err(DeviceError::Configuration(
                "oversampling ratio must be greater than 0".to_string(),
            ));
        }
        self.settings.lock().oversampling_ratio = ratio;
        Ok(())
    }

    fn set_trigger_condition(&self, channel: usize, condition: TriggerCondition) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.settings.lock().triggers[channel].condition = condition;
        Ok(())
    }

    fn set_trigger_mode(&self, channel: usize, mode: TriggerMode) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.settings.lock().triggers[channel].mode = mode;
        Ok(())
    }

    fn set_trigger_level(&self, channel: usize, level_volts: f64) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.settings.lock().triggers[channel].level = level_volts;
        Ok(())
    }

    fn set_trigger_source(&self, source: TriggerSource) -> Result<(), DeviceError> {
        self.settings.lock().trigger_source = source;
        Ok(())
    }

    fn set_trigger_delay(&self, delay: i32) -> Result<(), DeviceError> {
        self.settings.lock().trigger_delay = delay;
        Ok(())
    }

    fn calibrate_adc(&self) -> Result<(), DeviceError> {
        self.settings.lock().calibrations += 1;
        Ok(())
    }

    fn fetch_block(
        &self,
        channels: &[usize],
        block_size: usize,
        cancel: &FetchCancel,
    ) -> Result<Vec<Vec<f64>>, DeviceError> {
        if channels.is_empty() {
            return Err(DeviceError::FetchFailed("no channel requested".to_string()));
        }
        {
            let settings = self.settings.lock();
            for &channel in channels {
                self.check_channel(channel)?;
                if !settings.enabled[channel] {
                    return Err(DeviceError::FetchFailed(format!("channel {} is not enabled", channel)));
                }
            }
        }

        let mut acquisition = self.acquisition.lock();
        acquisition.in_flight += 1;

        let deadline = Instant::now() + Duration::from_millis(self.config.fetch_latency_ms);
        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(DeviceError::Cancelled);
            }
            if acquisition.hanging {
                self.wake.wait(&mut acquisition);
                continue;
            }
            if Instant::now() < deadline {
                self.wake.wait_until(&mut acquisition, deadline);
                continue;
            }
            break Ok(());
        };
        acquisition.in_flight -= 1;
        outcome?;

        if acquisition.fail_next {
            acquisition.fail_next = false;
            return Err(DeviceError::FetchFailed("injected failure".to_string()));
        }
        if let Some(limit) = self.config.fail_after_blocks {
            if self.blocks_fetched() >= limit {
                return Err(DeviceError::FetchFailed(format!(
                    "device stopped responding after {} blocks",
                    limit
                )));
            }
        }

        let block = self.generate(&mut acquisition, channels, block_size);
        self.blocks_fetched.fetch_add(1, Ordering::Relaxed);
        Ok(block)
    }

    fn cancel_fetch(&self, cancel: &FetchCancel) {
        // Arm under the lock so a fetch between its check and its wait still sees it
        let _acquisition = self.acquisition.lock();
        cancel.arm();
        self.wake.notify_all();
    }

    fn flush_residual(&self, cancel: &FetchCancel) {
        cancel.disarm();
        self.settings.lock().flushes += 1;
    }

    fn convert_raw_to_volts(&self, channel: usize, raw: f64) -> f64 {
        let range = self
            .settings
            .lock()
            .ranges
            .get(channel)
            .copied()
            .unwrap_or_default();
        raw * range.full_scale_volts() / (device::ADC_CODE_SPAN / 2) as f64
    }
}

/// Connector handing out simulated devices, one per URI
pub struct SimulatorConnector {
    config: SimulatorConfig,
    unreachable: HashSet<String>,
    devices: Mutex<HashMap<String, Arc<SimulatedAnalogIn>>>,
    opens: AtomicU64,
    closes: AtomicU64,
}

impl SimulatorConnector {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            unreachable: HashSet::new(),
            devices: Mutex::new(HashMap::new()),
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }

    /// Make `open` fail for `uri`
    pub fn with_unreachable(mut self, uri: &str) -> Self {
        self.unreachable.insert(uri.to_string());
        self
    }

    /// Concrete handle of an open device, for inspection and fault injection
    pub fn device(&self, uri: &str) -> Option<Arc<SimulatedAnalogIn>> {
        self.devices.lock().get(uri).cloned()
    }

    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

impl Default for SimulatorConnector {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl DeviceConnector for SimulatorConnector {
    fn open(&self, uri: &str) -> Result<Arc<dyn AnalogInDevice>, DeviceError> {
        if self.unreachable.contains(uri) {
            return Err(DeviceError::OpenFailed(format!("no device at '{}'", uri)));
        }

        let device = Arc::new(SimulatedAnalogIn::new(uri, self.config.clone())?);
        self.devices.lock().insert(uri.to_string(), device.clone());
        self.opens.fetch_add(1, Ordering::Relaxed);
        debug!(uri, "simulated device opened");
        Ok(device)
    }

    fn close(&self, device: &dyn AnalogInDevice) {
        self.devices.lock().remove(device.uri());
        self.closes.fetch_add(1, Ordering::Relaxed);
        debug!(uri = device.uri(), "simulated device closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn enabled_device(config: SimulatorConfig) -> SimulatedAnalogIn {
        let device = SimulatedAnalogIn::new("sim:test", config).unwrap();
        for channel in 0..device.channel_count() {
            device.enable_channel(channel, true).unwrap();
        }
        device
    }

    const BOTH: &[usize] = &[0, 1];

    #[test]
    fn test_ramp_is_continuous_across_blocks() {
        let device = enabled_device(SimulatorConfig::default());
        let pattern = device.config().pattern.clone();
        let cancel = FetchCancel::new();

        let first = device.fetch_block(BOTH, 16, &cancel).unwrap();
        let second = device.fetch_block(BOTH, 16, &cancel).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0][0], pattern.code(0, 0));
        assert_eq!(second[0][0], pattern.code(0, 16));
        assert_eq!(second[1][15], pattern.code(1, 31));
        assert_eq!(device.blocks_fetched(), 2);
    }

    #[test]
    fn test_rows_follow_requested_channels() {
        let device = enabled_device(SimulatorConfig::default());
        let pattern = device.config().pattern.clone();

        // Both channels are enabled, only channel 1 is asked for
        let block = device.fetch_block(&[1], 8, &FetchCancel::new()).unwrap();
        assert_eq!(block.len(), 1);
        assert_eq!(block[0][0], pattern.code(1, 0));

        let swapped = device.fetch_block(&[1, 0], 8, &FetchCancel::new()).unwrap();
        assert_eq!(swapped[0][0], pattern.code(1, 8));
        assert_eq!(swapped[1][0], pattern.code(0, 8));
    }

    #[test]
    fn test_disabled_channel_cannot_be_fetched() {
        let device = SimulatedAnalogIn::new("sim:test", SimulatorConfig::default()).unwrap();
        device.enable_channel(1, true).unwrap();
        let cancel = FetchCancel::new();

        assert!(matches!(device.fetch_block(&[0], 8, &cancel), Err(DeviceError::FetchFailed(_))));
        assert!(matches!(device.fetch_block(&[], 8, &cancel), Err(DeviceError::FetchFailed(_))));
        assert_eq!(
            device.fetch_block(&[5], 8, &cancel),
            Err(DeviceError::InvalidChannel { channel: 5, available: 2 })
        );
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let device = SimulatedAnalogIn::new("sim:test", SimulatorConfig::default()).unwrap();
        assert_eq!(
            device.enable_channel(2, true),
            Err(DeviceError::InvalidChannel { channel: 2, available: 2 })
        );
    }

    #[test]
    fn test_noise_keeps_codes_integral() {
        let device = enabled_device(SimulatorConfig {
            noise_codes: 3,
            ..Default::default()
        });

        let block = device.fetch_block(BOTH, 64, &FetchCancel::new()).unwrap();
        assert!(block[0].iter().all(|code| code.fract() == 0.0));
    }

    #[test]
    fn test_fail_after_blocks() {
        let device = enabled_device(SimulatorConfig {
            fail_after_blocks: Some(1),
            ..Default::default()
        });
        let cancel = FetchCancel::new();

        assert!(device.fetch_block(BOTH, 4, &cancel).is_ok());
        assert!(matches!(device.fetch_block(BOTH, 4, &cancel), Err(DeviceError::FetchFailed(_))));
    }

    #[test]
    fn test_cancel_unblocks_hanging_fetch() {
        let device = Arc::new(enabled_device(SimulatorConfig::default()));
        let cancel = FetchCancel::new();
        device.set_hanging(true);

        let fetcher = {
            let device = device.clone();
            let cancel = cancel.clone();
            thread::spawn(move || device.fetch_block(BOTH, 4, &cancel))
        };

        while device.fetches_in_flight() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        device.cancel_fetch(&cancel);

        assert_eq!(fetcher.join().unwrap(), Err(DeviceError::Cancelled));
    }

    #[test]
    fn test_cancel_only_interrupts_its_own_fetch() {
        let device = Arc::new(enabled_device(SimulatorConfig::default()));
        let mine = FetchCancel::new();
        let sibling = FetchCancel::new();
        device.set_hanging(true);

        let spawn_fetch = |cancel: &FetchCancel| {
            let device = device.clone();
            let cancel = cancel.clone();
            thread::spawn(move || device.fetch_block(BOTH, 4, &cancel))
        };
        let my_fetch = spawn_fetch(&mine);
        let sibling_fetch = spawn_fetch(&sibling);

        while device.fetches_in_flight() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        device.cancel_fetch(&mine);
        assert_eq!(my_fetch.join().unwrap(), Err(DeviceError::Cancelled));
        assert_eq!(device.fetches_in_flight(), 1);

        device.set_hanging(false);
        assert!(sibling_fetch.join().unwrap().is_ok());
        assert!(!sibling.is_cancelled());
    }

    #[test]
    fn test_cancel_is_sticky_until_flush() {
        let device = enabled_device(SimulatorConfig::default());
        let cancel = FetchCancel::new();

        device.cancel_fetch(&cancel);
        assert_eq!(device.fetch_block(BOTH, 4, &cancel), Err(DeviceError::Cancelled));
        assert!(device.fetch_block(BOTH, 4, &FetchCancel::new()).is_ok());

        device.flush_residual(&cancel);
        assert!(device.fetch_block(BOTH, 4, &cancel).is_ok());
        assert_eq!(device.settings().flushes, 1);
    }

    #[test]
    fn test_conversion_follows_range() {
        let device = enabled_device(SimulatorConfig::default());
        assert_eq!(device.convert_raw_to_volts(0, 1024.0), 12.5);

        device.set_range(0, InputRange::PlusMinus2_5V).unwrap();
        assert_eq!(device.convert_raw_to_volts(0, 1024.0), 1.25);
    }

    #[test]
    fn test_connector_tracks_devices() {
        let connector = SimulatorConnector::default().with_unreachable("sim:offline");

        assert!(matches!(connector.open("sim:offline"), Err(DeviceError::OpenFailed(_))));

        let device = connector.open("sim:bench").unwrap();
        assert!(connector.device("sim:bench").is_some());

        connector.close(device.as_ref());
        assert!(connector.device("sim:bench").is_none());
        assert_eq!(connector.open_count(), 1);
        assert_eq!(connector.close_count(), 1);
    }
}
