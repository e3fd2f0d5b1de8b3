// src/acquisition/output.rs
//! Output-side types shared between a source and the scheduler driving it

use serde::{Deserialize, Serialize};

/// Output element type, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Engineering units, `f32` volts per sample
    #[default]
    Volts,
    /// Device codes, `i16` per sample
    Raw,
}

impl OutputMode {
    /// Size in bytes of one output item
    pub fn item_size(self) -> usize {
        match self {
            OutputMode::Volts => std::mem::size_of::<f32>(),
            OutputMode::Raw => std::mem::size_of::<i16>(),
        }
    }
}

/// Outcome of one `work` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Number of items written to every output region
    Produced(usize),
    /// The source is stopped; no more output will follow
    EndOfStream,
}

impl WorkStatus {
    pub fn produced(self) -> usize {
        match self {
            WorkStatus::Produced(items) => items,
            WorkStatus::EndOfStream => 0,
        }
    }

    pub fn is_end_of_stream(self) -> bool {
        self == WorkStatus::EndOfStream
    }
}

/// Metadata attached to an output stream at an absolute item offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTag {
    /// Output stream index
    pub output: usize,
    /// Absolute item offset on that output
    pub offset: u64,
    pub key: &'static str,
    pub value: u64,
    pub source_id: String,
}

/// Messages published on a source's side notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMessage {
    /// No data arrived within one wait interval
    Timeout,
}

impl SourceMessage {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceMessage::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for SourceMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed output regions, one per active channel in channel order
#[derive(Debug)]
pub enum OutputRegions<'a> {
    Volts(Vec<&'a mut [f32]>),
    Raw(Vec<&'a mut [i16]>),
}

/// Output regions plus the tags a `work` call attached to them
#[derive(Debug)]
pub struct WorkOutputs<'a> {
    regions: OutputRegions<'a>,
    tags: Vec<StreamTag>,
}

impl<'a> WorkOutputs<'a> {
    pub fn volts(regions: Vec<&'a mut [f32]>) -> Self {
        Self {
            regions: OutputRegions::Volts(regions),
            tags: Vec::new(),
        }
    }

    pub fn raw(regions: Vec<&'a mut [i16]>) -> Self {
        Self {
            regions: OutputRegions::Raw(regions),
            tags: Vec::new(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        match self.regions {
            OutputRegions::Volts(_) => OutputMode::Volts,
            OutputRegions::Raw(_) => OutputMode::Raw,
        }
    }

    /// Number of output regions
    pub fn len(&self) -> usize {
        match &self.regions {
            OutputRegions::Volts(regions) => regions.len(),
            OutputRegions::Raw(regions) => regions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the smallest region
    pub fn capacity(&self) -> usize {
        match &self.regions {
            OutputRegions::Volts(regions) => regions.iter().map(|r| r.len()).min(),
            OutputRegions::Raw(regions) => regions.iter().map(|r| r.len()).min(),
        }
        .unwrap_or(0)
    }

    pub fn tags(&self) -> &[StreamTag] {
        &self.tags
    }

    pub fn take_tags(&mut self) -> Vec<StreamTag> {
        std::mem::take(&mut self.tags)
    }

    pub(crate) fn regions_mut(&mut self) -> &mut OutputRegions<'a> {
        &mut self.regions
    }

    pub(crate) fn push_tag(&mut self, tag: StreamTag) {
        self.tags.push(tag);
    }
}

/// Interface the outer scheduling framework drives
pub trait StreamBlock {
    type Error;

    fn start(&self) -> Result<(), Self::Error>;

    fn stop(&self) -> Result<(), Self::Error>;

    /// Produce up to `noutput_items` items into every output region
    fn work(&self, noutput_items: usize, outputs: &mut WorkOutputs<'_>) -> Result<WorkStatus, Self::Error>;

    fn output_count(&self) -> usize;

    fn output_item_size(&self) -> usize;
}
