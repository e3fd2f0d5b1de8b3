// src/acquisition/mod.rs
//! Block acquisition and streaming components

pub mod output;
pub(crate) mod refill;
pub mod sample_buffer;
pub mod setup;
pub mod source;

pub use output::{OutputMode, OutputRegions, SourceMessage, StreamBlock, StreamTag, WorkOutputs, WorkStatus};
pub use sample_buffer::{BlockError, SampleBuffer};
pub use setup::configure_device;
pub use source::{AnalogInSource, SourceStats};
