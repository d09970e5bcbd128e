//! Bounded buffer of glitch-bearing capture chunks.
//!
//! A long monitoring session on a flaky device can produce glitch chunks
//! indefinitely, so retention is capped: the buffer keeps the most recent
//! `capacity` blocks and evicts the oldest. Callers drain lazily.

use std::collections::VecDeque;

use tracing::debug;

use crate::block::SampleBlock;

/// Default number of glitch blocks retained (at 1024-frame chunks this is a
/// little over a second of audio per 64 saved blocks at 48 kHz).
pub const DEFAULT_SAVED_BLOCK_CAPACITY: usize = 64;

/// One retained chunk, tagged with its position in the stream.
#[derive(Debug, Clone)]
pub struct SavedBlock {
    /// Capture chunk counter at the time of detection.
    pub chunk_index: u64,
    /// Absolute frame of the chunk start.
    pub frame_offset: usize,
    pub block: SampleBlock,
}

#[derive(Debug)]
pub struct SavedBlocks {
    capacity: usize,
    blocks: VecDeque<SavedBlock>,
    evicted: u64,
}

impl SavedBlocks {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: VecDeque::with_capacity(capacity.max(1)),
            evicted: 0,
        }
    }

    pub fn push(&mut self, saved: SavedBlock) {
        if self.blocks.len() == self.capacity {
            self.blocks.pop_front();
            self.evicted += 1;
            debug!(evicted = self.evicted, "saved-block buffer full, dropped oldest");
        }
        self.blocks.push_back(saved);
    }

    /// Take everything retained so far, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<SavedBlock> {
        self.blocks.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks dropped because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(chunk_index: u64) -> SavedBlock {
        SavedBlock {
            chunk_index,
            frame_offset: chunk_index as usize * 1024,
            block: SampleBlock::from_mono(vec![0.0; 4], 48_000),
        }
    }

    #[test]
    fn keeps_most_recent_when_full() {
        let mut buffer = SavedBlocks::new(2);
        buffer.push(saved(0));
        buffer.push(saved(1));
        buffer.push(saved(2));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.evicted(), 1);
        let drained = buffer.drain();
        assert_eq!(drained[0].chunk_index, 1);
        assert_eq!(drained[1].chunk_index, 2);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut buffer = SavedBlocks::new(8);
        buffer.push(saved(0));
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_does_not_count_as_eviction() {
        let mut buffer = SavedBlocks::new(8);
        buffer.push(saved(0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.evicted(), 0);
    }
}
