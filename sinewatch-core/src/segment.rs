//! Overlap-aware block segmentation for bounded sources.
//!
//! Consecutive blocks share `overlap` frames so a glitch sitting on a block
//! boundary is seen whole by at least one block. The price is that the
//! overlap region is analyzed twice; the batch driver removes the resulting
//! exact duplicates with a global sort + unique pass.

use crate::error::{Result, SinewatchError};

/// Where one analysis block sits inside the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Zero-based block number.
    pub index: usize,
    /// Absolute start frame: `index * (blocksize - overlap)`.
    pub start: usize,
    /// Frames in this block: `blocksize`, except the final block which may
    /// be shorter.
    pub len: usize,
}

/// Precomputed segmentation of `total_frames` into overlapping blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockPlan {
    total_frames: usize,
    blocksize: usize,
    overlap: usize,
}

impl BlockPlan {
    /// # Errors
    /// `InvalidConfig` when `blocksize` is zero or `overlap >= blocksize`
    /// (the frame cursor could never advance).
    pub fn new(total_frames: usize, blocksize: usize, overlap: usize) -> Result<Self> {
        if blocksize == 0 {
            return Err(SinewatchError::invalid("blocksize", "must be positive"));
        }
        if overlap >= blocksize {
            return Err(SinewatchError::invalid(
                "overlap",
                format!("{overlap} must be smaller than blocksize {blocksize}"),
            ));
        }
        Ok(Self {
            total_frames,
            blocksize,
            overlap,
        })
    }

    /// Frames the cursor advances between blocks.
    pub fn stride(&self) -> usize {
        self.blocksize - self.overlap
    }

    /// `ceil(total_frames / stride)`.
    pub fn block_count(&self) -> usize {
        self.total_frames.div_ceil(self.stride())
    }

    /// Iterate spans in order. The absolute start frame is monotonically
    /// increasing; it never regresses.
    pub fn iter(&self) -> impl Iterator<Item = BlockSpan> + '_ {
        let stride = self.stride();
        (0..self.block_count()).map(move |index| {
            let start = index * stride;
            let len = self.blocksize.min(self.total_frames - start);
            BlockSpan { index, start, len }
        })
    }
}
