// src/registry.rs
//! Shared device context registry
//!
//! Maps a connection URI to one open device handle shared by every source
//! using that URI. Handles are reference counted: each `acquire` must be
//! paired with a `release`, and the connection closes when the last
//! reference goes away. Open-on-miss, insert and remove all run under the
//! same lock, so concurrent sources never open the same URI twice.

use crate::error::RegistryError;
use crate::hal::{AnalogInDevice, DeviceConnector};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct Entry {
    device: Arc<dyn AnalogInDevice>,
    refs: usize,
}

/// Injectable cache of open device contexts
pub struct ContextRegistry {
    connector: Arc<dyn DeviceConnector>,
    contexts: Mutex<HashMap<String, Entry>>,
}

impl ContextRegistry {
    pub fn new(connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            connector,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle registered for `uri`, opening it on first use
    pub fn acquire(&self, uri: &str) -> Result<Arc<dyn AnalogInDevice>, RegistryError> {
        let mut contexts = self.contexts.lock();

        if let Some(entry) = contexts.get_mut(uri) {
            entry.refs += 1;
            debug!(uri, refs = entry.refs, "reusing device context");
            return Ok(entry.device.clone());
        }

        let device = self.connector.open(uri).map_err(|source| RegistryError::DeviceOpen {
            uri: uri.to_string(),
            source,
        })?;
        contexts.insert(
            uri.to_string(),
            Entry {
                device: device.clone(),
                refs: 1,
            },
        );
        info!(uri, "device context opened");
        Ok(device)
    }

    /// Drop one reference to `uri`, closing the handle when none remain.
    /// Unknown URIs are ignored.
    pub fn release(&self, uri: &str) {
        let mut contexts = self.contexts.lock();

        let Some(entry) = contexts.get_mut(uri) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            debug!(uri, refs = entry.refs, "device context released");
            return;
        }

        if let Some(entry) = contexts.remove(uri) {
            self.connector.close(entry.device.as_ref());
            info!(uri, "device context closed");
        }
    }

    /// Acquire `uri` wrapped in a guard that releases it on drop
    pub fn lease(self: &Arc<Self>, uri: &str) -> Result<DeviceLease, RegistryError> {
        let device = self.acquire(uri)?;
        Ok(DeviceLease {
            registry: Arc::clone(self),
            uri: uri.to_string(),
            device,
        })
    }

    /// Outstanding references to `uri`, 0 when not open
    pub fn ref_count(&self, uri: &str) -> usize {
        self.contexts.lock().get(uri).map_or(0, |entry| entry.refs)
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.contexts.lock().contains_key(uri)
    }

    /// Number of open contexts
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Close every context regardless of outstanding references
    pub fn close_all(&self) {
        let mut contexts = self.contexts.lock();
        for (uri, entry) in contexts.drain() {
            self.connector.close(entry.device.as_ref());
            info!(uri = %uri, refs = entry.refs, "device context force-closed");
        }
    }
}

/// One counted reference to a shared device context
pub struct DeviceLease {
    registry: Arc<ContextRegistry>,
    uri: String,
    device: Arc<dyn AnalogInDevice>,
}

impl DeviceLease {
    pub fn device(&self) -> &Arc<dyn AnalogInDevice> {
        &self.device
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.registry.release(&self.uri);
    }
}
