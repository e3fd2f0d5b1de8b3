// src/acquisition/source.rs
//! Analog input streaming source
//!
//! Bridges a device that delivers samples in large blocks to a scheduler
//! that asks for arbitrary item counts. A background refill thread fetches
//! one block at a time; `work` drains it into the scheduler's regions.

use crate::acquisition::output::{
    OutputMode, OutputRegions, SourceMessage, StreamBlock, StreamTag, WorkOutputs, WorkStatus,
};
use crate::acquisition::refill::{self, Handoff};
use crate::acquisition::sample_buffer::SampleBuffer;
use crate::acquisition::setup::configure_device;
use crate::config::constants::streaming;
use crate::config::{SourceConfig, WaitPolicy};
use crate::error::{ConversionTarget, SourceError, SourceResult};
use crate::hal::AnalogInDevice;
use crate::registry::{ContextRegistry, DeviceLease};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Counters describing a source since construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceStats {
    pub blocks_fetched: u64,
    pub items_fetched: u64,
    /// Items written per output
    pub items_written: u64,
    pub timeouts: u64,
    pub running: bool,
}

/// Block-to-stream adapter for one analog input device
pub struct AnalogInSource {
    config: SourceConfig,
    lease: DeviceLease,
    /// Physical channel behind each output, in output order
    output_channels: Vec<usize>,
    handoff: Arc<Handoff>,
    refill_thread: Mutex<Option<JoinHandle<()>>>,
    notifications: Sender<SourceMessage>,
    listener: Receiver<SourceMessage>,
    timeouts: AtomicU64,
    source_id: String,
}

impl AnalogInSource {
    /// Validate `config`, lease the device from `registry` and configure it.
    ///
    /// Nothing is fetched until [`start`](Self::start) is called.
    pub fn new(config: SourceConfig, registry: &Arc<ContextRegistry>) -> SourceResult<Self> {
        config.validate().map_err(SourceError::Configuration)?;

        let lease = registry.lease(&config.uri)?;
        let device = lease.device();

        if config.channels.len() > device.channel_count() {
            return Err(SourceError::Configuration(vec![format!(
                "{} channels selected, device '{}' has {}",
                config.channels.len(),
                config.uri,
                device.channel_count()
            )]));
        }

        configure_device(device.as_ref(), &config)?;

        let output_channels = config.channels.active_channels();
        let (notifications, listener) = channel::bounded(config.notification_capacity);
        let source_id = format!("analog_in({})", config.uri);

        info!(
            uri = %config.uri,
            outputs = output_channels.len(),
            block_size = config.block_size,
            mode = ?config.output_mode,
            "analog input source created"
        );

        Ok(Self {
            handoff: Arc::new(Handoff::new(output_channels.len())),
            output_channels,
            lease,
            refill_thread: Mutex::new(None),
            notifications,
            listener,
            timeouts: AtomicU64::new(0),
            source_id,
            config,
        })
    }

    /// Configuration the source was built with
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Shared device handle, possibly used by other sources too
    pub fn device(&self) -> &Arc<dyn AnalogInDevice> {
        self.lease.device()
    }

    /// Identifier carried by every tag this source emits
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Physical channel feeding each output stream
    pub fn output_channels(&self) -> &[usize] {
        &self.output_channels
    }

    /// Receiving end of the side notification channel
    pub fn messages(&self) -> Receiver<SourceMessage> {
        self.listener.clone()
    }

    /// Whether the source is started and has not stopped
    pub fn is_running(&self) -> bool {
        !self.handoff.lock().stopped
    }

    /// Reason the refill thread stopped the source, if it did
    pub fn last_fault(&self) -> Option<String> {
        self.handoff.lock().fault.clone()
    }

    /// Snapshot of the fetch, output and timeout counters
    pub fn stats(&self) -> SourceStats {
        let state = self.handoff.lock();
        SourceStats {
            blocks_fetched: state.blocks_fetched,
            items_fetched: state.items_fetched,
            items_written: state.items_written,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            running: !state.stopped,
        }
    }

    /// Reset the buffer and spawn the refill thread
    pub fn start(&self) -> SourceResult<()> {
        let mut refill_thread = self.refill_thread.lock();

        if refill_thread.is_some() {
            if !self.handoff.lock().stopped {
                return Err(SourceError::AlreadyRunning);
            }
            // Stopped on its own; reap it before starting over
            self.shutdown(&mut refill_thread);
        }

        {
            let mut state = self.handoff.lock();
            state.buffer.clear();
            state.empty = true;
            state.stopped = false;
            state.fault = None;
        }

        let name = format!("{}-{}", streaming::REFILL_THREAD_PREFIX, self.config.uri);
        let spawned = refill::spawn(
            name,
            Arc::clone(&self.handoff),
            Arc::clone(self.lease.device()),
            self.output_channels.clone(),
            self.config.block_size,
        );
        match spawned {
            Ok(handle) => *refill_thread = Some(handle),
            Err(e) => {
                self.handoff.lock().stopped = true;
                return Err(SourceError::ThreadSpawn(e));
            }
        }

        info!(uri = %self.config.uri, "analog input source started");
        Ok(())
    }

    /// Stop streaming and join the refill thread. Safe to call repeatedly.
    pub fn stop(&self) -> SourceResult<()> {
        let mut refill_thread = self.refill_thread.lock();

        if refill_thread.is_none() {
            let mut state = self.handoff.lock();
            state.stopped = true;
            state.empty = true;
            self.handoff.cond.notify_all();
            return Ok(());
        }

        self.shutdown(&mut refill_thread);
        info!(uri = %self.config.uri, "analog input source stopped");
        Ok(())
    }

    fn shutdown(&self, refill_thread: &mut Option<JoinHandle<()>>) {
        let device = self.lease.device();
        // Scoped to this source; siblings on the same handle keep fetching
        device.cancel_fetch(&self.handoff.cancel);

        {
            let mut state = self.handoff.lock();
            state.empty = true;
            state.stopped = true;
            self.handoff.cond.notify_all();
        }

        if let Some(handle) = refill_thread.take() {
            if handle.join().is_err() {
                error!(uri = %self.config.uri, "refill thread panicked");
            }
        }

        device.flush_residual(&self.handoff.cancel);
    }

    /// Fill up to `noutput_items` items into every output region
    pub fn work(&self, noutput_items: usize, outputs: &mut WorkOutputs<'_>) -> SourceResult<WorkStatus> {
        self.check_outputs(noutput_items, outputs)?;

        let mut state = self.handoff.lock();
        if state.stopped {
            return Ok(WorkStatus::EndOfStream);
        }
        if noutput_items == 0 {
            return Ok(WorkStatus::Produced(0));
        }

        if state.buffer.is_drained() {
            state.empty = true;
            self.handoff.cond.notify_all();
        }

        let interval = self.config.wait.timeout();
        let mut deadline = Instant::now() + interval;
        let mut elapsed_intervals = 0u32;

        while state.empty {
            self.handoff.cond.wait_until(&mut state, deadline);
            if state.stopped {
                return Ok(WorkStatus::EndOfStream);
            }
            if !state.empty {
                break;
            }
            if Instant::now() < deadline {
                // Spurious wake-up, keep the current interval
                continue;
            }

            elapsed_intervals += 1;
            self.report_timeout();

            if let WaitPolicy::Bounded { max_timeouts } = self.config.wait.policy {
                if elapsed_intervals >= max_timeouts {
                    return Ok(WorkStatus::Produced(0));
                }
            }
            deadline += interval;
        }

        let items = state.buffer.remaining().min(noutput_items);
        let fresh = state.buffer.is_fresh();
        let offset = state.items_written;
        let total = state.buffer.total() as u64;

        if let Err(e) = self.copy_out(&state.buffer, items, outputs) {
            error!(uri = %self.config.uri, error = %e, "sample conversion failed, stopping source");
            state.stopped = true;
            state.empty = true;
            self.handoff.cond.notify_all();
            return Err(e);
        }

        if fresh {
            for output in 0..self.output_channels.len() {
                outputs.push_tag(StreamTag {
                    output,
                    offset,
                    key: streaming::BUFFER_START_TAG,
                    value: total,
                    source_id: self.source_id.clone(),
                });
            }
        }

        state.buffer.advance(items);
        state.items_written += items as u64;
        trace!(items, remaining = state.buffer.remaining(), "work produced");

        Ok(WorkStatus::Produced(items))
    }

    fn check_outputs(&self, noutput_items: usize, outputs: &WorkOutputs<'_>) -> SourceResult<()> {
        if outputs.mode() != self.config.output_mode {
            return Err(SourceError::InvalidOutput(format!(
                "expected {:?} regions, got {:?}",
                self.config.output_mode,
                outputs.mode()
            )));
        }
        if outputs.len() != self.output_channels.len() {
            return Err(SourceError::InvalidOutput(format!(
                "expected {} regions, got {}",
                self.output_channels.len(),
                outputs.len()
            )));
        }
        if outputs.capacity() < noutput_items {
            return Err(SourceError::InvalidOutput(format!(
                "{} items requested, smallest region holds {}",
                noutput_items,
                outputs.capacity()
            )));
        }
        Ok(())
    }

    fn copy_out(&self, buffer: &SampleBuffer, items: usize, outputs: &mut WorkOutputs<'_>) -> SourceResult<()> {
        let device = self.lease.device();

        match outputs.regions_mut() {
            OutputRegions::Volts(regions) => {
                for (row, region) in regions.iter_mut().enumerate() {
                    let channel = self.output_channels[row];
                    for (slot, &raw) in region[..items].iter_mut().zip(buffer.pending(row, items)) {
                        *slot = narrow_volts(channel, device.convert_raw_to_volts(channel, raw))?;
                    }
                }
            }
            OutputRegions::Raw(regions) => {
                for (row, region) in regions.iter_mut().enumerate() {
                    let channel = self.output_channels[row];
                    for (slot, &raw) in region[..items].iter_mut().zip(buffer.pending(row, items)) {
                        *slot = narrow_code(channel, raw)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn report_timeout(&self) {
        let total = self.timeouts.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            uri = %self.config.uri,
            timeout_ms = self.config.wait.timeout_ms,
            total,
            "no samples within wait interval"
        );

        match self.notifications.try_send(SourceMessage::Timeout) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => trace!(%message, "notification channel full, message dropped"),
            Err(TrySendError::Disconnected(message)) => trace!(%message, "no notification listener"),
        }
    }
}

fn narrow_volts(channel: usize, volts: f64) -> SourceResult<f32> {
    let narrowed = volts as f32;
    if !narrowed.is_finite() {
        return Err(SourceError::Conversion {
            channel,
            value: volts,
            target: ConversionTarget::Volts,
        });
    }
    Ok(narrowed)
}

fn narrow_code(channel: usize, raw: f64) -> SourceResult<i16> {
    let representable = raw.fract() == 0.0 && raw >= i16::MIN as f64 && raw <= i16::MAX as f64;
    if !representable {
        return Err(SourceError::Conversion {
            channel,
            value: raw,
            target: ConversionTarget::RawCode,
        });
    }
    Ok(raw as i16)
}

impl StreamBlock for AnalogInSource {
    type Error = SourceError;

    fn start(&self) -> SourceResult<()> {
        AnalogInSource::start(self)
    }

    fn stop(&self) -> SourceResult<()> {
        AnalogInSource::stop(self)
    }

    fn work(&self, noutput_items: usize, outputs: &mut WorkOutputs<'_>) -> SourceResult<WorkStatus> {
        AnalogInSource::work(self, noutput_items, outputs)
    }

    fn output_count(&self) -> usize {
        self.output_channels.len()
    }

    fn output_item_size(&self) -> usize {
        self.config.output_mode.item_size()
    }
}

impl Drop for AnalogInSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!(uri = %self.config.uri, error = %e, "stop during drop failed");
        }
    }
}

impl std::fmt::Debug for AnalogInSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalogInSource")
            .field("source_id", &self.source_id)
            .field("output_channels", &self.output_channels)
            .field("output_mode", &self.config.output_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaitConfig;
    use crate::hal::simulator::{SignalPattern, SimulatedAnalogIn, SimulatorConfig, SimulatorConnector};
    use crate::hal::ChannelSelection;
    use std::time::Duration;

    const URI: &str = "sim:unit";

    fn setup(sim: SimulatorConfig) -> (Arc<SimulatorConnector>, Arc<ContextRegistry>) {
        let connector = Arc::new(SimulatorConnector::new(sim));
        let registry = Arc::new(ContextRegistry::new(connector.clone()));
        (connector, registry)
    }

    fn config(block_size: usize, output_mode: OutputMode) -> SourceConfig {
        SourceConfig {
            uri: URI.to_string(),
            block_size,
            output_mode,
            wait: WaitConfig {
                timeout_ms: 2_000,
                policy: WaitPolicy::Bounded { max_timeouts: 1 },
            },
            ..Default::default()
        }
    }

    fn device(connector: &SimulatorConnector) -> Arc<SimulatedAnalogIn> {
        connector.device(URI).unwrap()
    }

    fn work_raw(source: &AnalogInSource, items: usize) -> (WorkStatus, Vec<Vec<i16>>, Vec<StreamTag>) {
        let count = source.output_count();
        let mut storage = vec![vec![0i16; items]; count];
        let (status, tags) = {
            let mut outputs = WorkOutputs::raw(storage.iter_mut().map(|v| v.as_mut_slice()).collect());
            let status = source.work(items, &mut outputs).unwrap();
            (status, outputs.take_tags())
        };
        for region in &mut storage {
            region.truncate(status.produced());
        }
        (status, storage, tags)
    }

    #[test]
    fn test_work_before_start_is_end_of_stream() {
        let (_, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(64, OutputMode::Raw), &registry).unwrap();

        let (status, _, _) = work_raw(&source, 16);
        assert_eq!(status, WorkStatus::EndOfStream);
    }

    #[test]
    fn test_partial_reads_do_not_refetch() {
        let (connector, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(64, OutputMode::Raw), &registry).unwrap();
        source.start().unwrap();

        let (first, samples, tags) = work_raw(&source, 40);
        assert_eq!(first, WorkStatus::Produced(40));
        assert_eq!(samples[0][0], -2048);
        assert_eq!(tags.len(), 2);

        let (second, samples, tags) = work_raw(&source, 40);
        assert_eq!(second, WorkStatus::Produced(24));
        assert_eq!(samples[0][0], -2048 + 40);
        assert!(tags.is_empty());
        assert_eq!(device(&connector).blocks_fetched(), 1);

        source.stop().unwrap();
    }

    #[test]
    fn test_volts_mode_converts_per_channel_range() {
        let sim = SimulatorConfig {
            pattern: SignalPattern::Constant { code: 1024.0 },
            ..Default::default()
        };
        let (_, registry) = setup(sim);
        let mut cfg = config(8, OutputMode::Volts);
        cfg.ranges[1] = crate::hal::InputRange::PlusMinus2_5V;
        let source = AnalogInSource::new(cfg, &registry).unwrap();
        source.start().unwrap();

        let mut ch0 = [0f32; 8];
        let mut ch1 = [0f32; 8];
        let mut outputs = WorkOutputs::volts(vec![&mut ch0[..], &mut ch1[..]]);
        assert_eq!(source.work(8, &mut outputs).unwrap(), WorkStatus::Produced(8));
        drop(outputs);

        assert!(ch0.iter().all(|&v| v == 12.5));
        assert!(ch1.iter().all(|&v| v == 1.25));
    }

    #[test]
    fn test_raw_code_out_of_range_is_fatal() {
        let sim = SimulatorConfig {
            pattern: SignalPattern::Constant { code: 40_000.0 },
            ..Default::default()
        };
        let (_, registry) = setup(sim);
        let source = AnalogInSource::new(config(8, OutputMode::Raw), &registry).unwrap();
        source.start().unwrap();

        let mut a = [0i16; 8];
        let mut b = [0i16; 8];
        let mut outputs = WorkOutputs::raw(vec![&mut a[..], &mut b[..]]);
        let err = source.work(8, &mut outputs).unwrap_err();
        assert!(err.is_fatal());
        assert!(!source.is_running());
        assert_eq!(source.work(8, &mut outputs).unwrap(), WorkStatus::EndOfStream);
    }

    #[test]
    fn test_narrowing_rules() {
        assert_eq!(narrow_code(0, -2048.0).unwrap(), -2048);
        assert!(narrow_code(0, 0.5).is_err());
        assert!(narrow_code(0, 32768.0).is_err());
        assert!(narrow_volts(0, f64::NAN).is_err());
        assert!(narrow_volts(0, 1e300).is_err());
        assert_eq!(narrow_volts(0, 1.5).unwrap(), 1.5);
    }

    #[test]
    fn test_output_mismatch_rejected() {
        let (_, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(8, OutputMode::Raw), &registry).unwrap();

        let mut a = [0f32; 8];
        let mut b = [0f32; 8];
        let mut outputs = WorkOutputs::volts(vec![&mut a[..], &mut b[..]]);
        assert!(matches!(source.work(8, &mut outputs), Err(SourceError::InvalidOutput(_))));

        let mut only = [0i16; 8];
        let mut outputs = WorkOutputs::raw(vec![&mut only[..]]);
        assert!(matches!(source.work(8, &mut outputs), Err(SourceError::InvalidOutput(_))));

        let mut a = [0i16; 8];
        let mut b = [0i16; 4];
        let mut outputs = WorkOutputs::raw(vec![&mut a[..], &mut b[..]]);
        assert!(matches!(source.work(8, &mut outputs), Err(SourceError::InvalidOutput(_))));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (_, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(8, OutputMode::Raw), &registry).unwrap();

        source.start().unwrap();
        assert!(matches!(source.start(), Err(SourceError::AlreadyRunning)));
        source.stop().unwrap();
        source.start().unwrap();
        assert!(source.is_running());
    }

    #[test]
    fn test_restart_after_fetch_failure() {
        let (connector, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(8, OutputMode::Raw), &registry).unwrap();
        device(&connector).fail_next_fetch();
        source.start().unwrap();

        let (status, _, _) = work_raw(&source, 8);
        assert_eq!(status, WorkStatus::EndOfStream);
        assert!(source.last_fault().unwrap().contains("injected failure"));

        source.start().unwrap();
        let (status, _, _) = work_raw(&source, 8);
        assert_eq!(status, WorkStatus::Produced(8));
        assert!(source.last_fault().is_none());
    }

    #[test]
    fn test_selection_longer_than_device_rejected() {
        let (connector, registry) = setup(SimulatorConfig::default());
        let mut cfg = config(8, OutputMode::Raw);
        cfg.channels = ChannelSelection::new(vec![true, false, false]);
        cfg.ranges.push(Default::default());
        cfg.triggers.push(Default::default());

        assert!(matches!(
            AnalogInSource::new(cfg, &registry),
            Err(SourceError::Configuration(_))
        ));
        assert_eq!(registry.ref_count(URI), 0);
        assert_eq!(connector.close_count(), 1);
    }

    #[test]
    fn test_until_data_reports_every_interval() {
        let (connector, registry) = setup(SimulatorConfig::default());
        let mut cfg = config(8, OutputMode::Raw);
        cfg.wait = WaitConfig {
            timeout_ms: 20,
            policy: WaitPolicy::UntilData,
        };
        let source = Arc::new(AnalogInSource::new(cfg, &registry).unwrap());
        let messages = source.messages();
        device(&connector).set_hanging(true);
        source.start().unwrap();

        let worker = {
            let source = source.clone();
            std::thread::spawn(move || work_raw(&source, 8).0)
        };

        // Wait for a few intervals, then let data through
        messages.recv_timeout(Duration::from_secs(2)).unwrap();
        messages.recv_timeout(Duration::from_secs(2)).unwrap();
        device(&connector).set_hanging(false);

        assert_eq!(worker.join().unwrap(), WorkStatus::Produced(8));
        assert!(source.stats().timeouts >= 2);
        source.stop().unwrap();
    }

    #[test]
    fn test_stats_track_progress() {
        let (_, registry) = setup(SimulatorConfig::default());
        let source = AnalogInSource::new(config(16, OutputMode::Raw), &registry).unwrap();
        source.start().unwrap();

        work_raw(&source, 10);
        work_raw(&source, 10);

        let stats = source.stats();
        assert_eq!(stats.blocks_fetched, 1);
        assert_eq!(stats.items_fetched, 16);
        assert_eq!(stats.items_written, 16);
        assert!(stats.running);
    }
}
