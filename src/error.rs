// src/error.rs
//! Unified error handling for the acquisition engine
//!
//! Errors raised in the foreground (device open, configuration, output
//! conversion) propagate as ordinary `Result`s. Errors raised on the refill
//! thread never cross the thread boundary: they are folded into the source's
//! stopped flag and surface as end-of-stream on the next `work` call.

use crate::hal::DeviceError;
use thiserror::Error;

/// Errors raised by the shared context registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The connector could not open the device behind `uri`
    #[error("unable to open device context '{uri}': {source}")]
    DeviceOpen {
        uri: String,
        #[source]
        source: DeviceError,
    },
}

/// Target width of a failed narrowing conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionTarget {
    /// Engineering-unit output (`f32`)
    Volts,
    /// Raw device code output (`i16`)
    RawCode,
}

impl std::fmt::Display for ConversionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionTarget::Volts => write!(f, "f32 volts"),
            ConversionTarget::RawCode => write!(f, "i16 raw code"),
        }
    }
}

/// Unified error type for analog input sources
#[derive(Debug, Error)]
pub enum SourceError {
    /// Device context could not be acquired
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Device rejected a configuration call
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Source configuration is inconsistent
    #[error("invalid source configuration: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// A sample could not be represented in the output width. Fatal for the instance.
    #[error("cannot convert sample {value} on channel {channel} to {target}")]
    Conversion {
        channel: usize,
        value: f64,
        target: ConversionTarget,
    },

    /// The scheduler handed over output regions that do not fit this source
    #[error("invalid output regions: {0}")]
    InvalidOutput(String),

    /// `start()` was called while the refill thread is still attached
    #[error("source is already running")]
    AlreadyRunning,

    /// The refill thread could not be spawned
    #[error("failed to spawn refill thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

impl SourceError {
    /// Whether the error leaves the source permanently stopped
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Conversion { .. })
    }
}

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;
