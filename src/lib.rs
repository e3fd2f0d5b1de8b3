//! analog-in-core: block-to-stream buffering for analog input devices
//!
//! Acquisition hardware delivers samples in large blocks through a blocking
//! fetch call, while a dataflow scheduler asks for arbitrary item counts. This
//! library sits between the two:
//!
//! - Shared, reference-counted device contexts keyed by connection URI
//! - A background refill thread keeping one fetch in flight
//! - A bounded-wait streaming call producing volts (`f32`) or raw codes (`i16`)
//! - Buffer-start tags and timeout notifications for downstream consumers
//! - Layered TOML/environment configuration
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use analog_in_core::acquisition::{AnalogInSource, WorkOutputs};
//! use analog_in_core::config::SourceConfig;
//! use analog_in_core::hal::simulator::SimulatorConnector;
//! use analog_in_core::registry::ContextRegistry;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ContextRegistry::new(Arc::new(SimulatorConnector::default())));
//!     let source = AnalogInSource::new(SourceConfig::default(), &registry)?;
//!     source.start()?;
//!
//!     let mut ch1 = vec![0f32; 256];
//!     let mut ch2 = vec![0f32; 256];
//!     let mut outputs = WorkOutputs::volts(vec![&mut ch1[..], &mut ch2[..]]);
//!     let status = source.work(256, &mut outputs)?;
//!     println!("produced {:?}, tags {:?}", status, outputs.tags());
//!
//!     source.stop()?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod registry;

// Re-export commonly used types for convenience
pub use acquisition::{AnalogInSource, OutputMode, SourceMessage, SourceStats, StreamBlock, StreamTag, WorkOutputs, WorkStatus};
pub use config::{ConfigLoader, SourceConfig, WaitConfig, WaitPolicy};
pub use error::{RegistryError, SourceError, SourceResult};
pub use hal::{AnalogInDevice, ChannelSelection, DeviceConnector, DeviceError, FetchCancel};
pub use registry::{ContextRegistry, DeviceLease};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Block-to-stream buffering for analog input devices".to_string(),
        features: vec![
            "Shared device contexts".to_string(),
            "Background block refill".to_string(),
            "Volts and raw code output".to_string(),
            "Layered configuration".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
