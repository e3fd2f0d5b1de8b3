// src/acquisition/sample_buffer.rs
//! Most recent raw acquisition block with a shared read cursor

use ndarray::{s, Array2, ArrayView1};
use thiserror::Error;

/// Reasons a fetched block cannot be installed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("device returned {actual} channel sequences, expected {expected}")]
    ChannelCount { expected: usize, actual: usize },
    #[error("channel sequence {index} has {actual} samples, expected {expected}")]
    Ragged {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("device returned an empty block")]
    Empty,
    #[error("block shape mismatch: {0}")]
    Shape(String),
}

/// Raw samples of one fetch, one row per active channel.
///
/// All channels are sampled synchronously, so a single cursor serves every
/// row. `read_cursor() + remaining() == total()` holds at all times.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Array2<f64>,
    read_cursor: usize,
    remaining: usize,
}

impl SampleBuffer {
    /// Empty buffer for `channels` active channels
    pub fn new(channels: usize) -> Self {
        Self {
            samples: Array2::zeros((channels, 0)),
            read_cursor: 0,
            remaining: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Items per channel in the installed block
    pub fn total(&self) -> usize {
        self.samples.ncols()
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_drained(&self) -> bool {
        self.remaining == 0
    }

    /// True until the first item of the installed block has been read
    pub fn is_fresh(&self) -> bool {
        self.read_cursor == 0 && self.remaining > 0
    }

    /// Replace the contents with a fetched block and rewind the cursor
    pub fn install(&mut self, block: Vec<Vec<f64>>) -> Result<usize, BlockError> {
        let channels = self.channels();
        if block.len() != channels {
            return Err(BlockError::ChannelCount {
                expected: channels,
                actual: block.len(),
            });
        }

        let length = block.first().map(Vec::len).unwrap_or(0);
        if length == 0 {
            return Err(BlockError::Empty);
        }
        if let Some((index, sequence)) = block.iter().enumerate().find(|(_, s)| s.len() != length) {
            return Err(BlockError::Ragged {
                index,
                expected: length,
                actual: sequence.len(),
            });
        }

        let flat: Vec<f64> = block.into_iter().flatten().collect();
        self.samples = Array2::from_shape_vec((channels, length), flat)
            .map_err(|e| BlockError::Shape(e.to_string()))?;
        self.read_cursor = 0;
        self.remaining = length;
        Ok(length)
    }

    /// The next `count` unread samples of row `channel`
    pub fn pending(&self, channel: usize, count: usize) -> ArrayView1<'_, f64> {
        let end = self.read_cursor + count.min(self.remaining);
        self.samples.slice(s![channel, self.read_cursor..end])
    }

    /// Mark `count` items as consumed on every channel
    pub fn advance(&mut self, count: usize) {
        let count = count.min(self.remaining);
        self.read_cursor += count;
        self.remaining -= count;
    }

    /// Drop the installed block
    pub fn clear(&mut self) {
        self.samples = Array2::zeros((self.channels(), 0));
        self.read_cursor = 0;
        self.remaining = 0;
    }
}
