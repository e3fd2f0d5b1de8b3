// src/acquisition/refill.rs
//! Background refill task
//!
//! Keeps exactly one fetch in flight whenever the sample buffer is empty and
//! the source runs. The fetch is the only unbounded wait in the engine and
//! happens with the handoff lock released.

use crate::acquisition::sample_buffer::SampleBuffer;
use crate::hal::{AnalogInDevice, FetchCancel};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// State shared between the refill thread and the streaming task
pub(crate) struct HandoffState {
    pub buffer: SampleBuffer,
    /// Refill owns the buffer while set, the streaming task while clear
    pub empty: bool,
    pub stopped: bool,
    /// Reason the refill task stopped itself, if it did
    pub fault: Option<String>,
    /// Items written per output since construction
    pub items_written: u64,
    pub blocks_fetched: u64,
    pub items_fetched: u64,
}

/// Mutex, condition variable and the state they guard
pub(crate) struct Handoff {
    pub state: Mutex<HandoffState>,
    pub cond: Condvar,
    /// Interrupts this source's fetches only, never a sibling's on the same device
    pub cancel: FetchCancel,
}

impl Handoff {
    /// Stopped, empty handoff for `channels` active channels
    pub fn new(channels: usize) -> Self {
        Self {
            state: Mutex::new(HandoffState {
                buffer: SampleBuffer::new(channels),
                empty: true,
                stopped: true,
                fault: None,
                items_written: 0,
                blocks_fetched: 0,
                items_fetched: 0,
            }),
            cond: Condvar::new(),
            cancel: FetchCancel::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, HandoffState> {
        self.state.lock()
    }
}

/// Spawn the refill loop on a dedicated named thread
pub(crate) fn spawn(
    name: String,
    handoff: Arc<Handoff>,
    device: Arc<dyn AnalogInDevice>,
    channels: Vec<usize>,
    block_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || run(&handoff, device.as_ref(), &channels, block_size))
}

/// Refill loop body fetching rows for the physical `channels`.
/// Returns once the source is stopped or a fetch fails.
pub(crate) fn run(handoff: &Handoff, device: &dyn AnalogInDevice, channels: &[usize], block_size: usize) {
    let mut state = handoff.lock();

    loop {
        if state.stopped {
            break;
        }
        while !state.empty && !state.stopped {
            handoff.cond.wait(&mut state);
        }
        if state.stopped {
            break;
        }

        let fetched = MutexGuard::unlocked(&mut state, || {
            device.fetch_block(channels, block_size, &handoff.cancel)
        });

        if state.stopped {
            debug!(uri = device.uri(), "discarding fetch completed during stop");
            break;
        }

        let installed = fetched
            .map_err(|e| e.to_string())
            .and_then(|block| state.buffer.install(block).map_err(|e| e.to_string()));

        match installed {
            Ok(items) => {
                state.blocks_fetched += 1;
                state.items_fetched += items as u64;
                state.empty = false;
                debug!(uri = device.uri(), items, block = state.blocks_fetched, "buffer refilled");
                handoff.cond.notify_all();
            }
            Err(reason) => {
                error!(uri = device.uri(), %reason, "refill failed, stopping source");
                state.stopped = true;
                state.fault = Some(reason);
                handoff.cond.notify_all();
                break;
            }
        }
    }

    debug!(uri = device.uri(), "refill task exited");
}
