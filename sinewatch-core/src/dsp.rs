//! Low-level signal analysis: derivative, threshold scan, windowed merge,
//! normalization and raw PCM decoding.
//!
//! Everything here is a pure function over slices (no state, no I/O) so
//! the same code path serves both batch blocks and live capture chunks.

use crate::block::SampleBlock;
use crate::error::{Result, SinewatchError};

/// Minimum spacing (samples) between two reported glitches. One physical
/// glitch typically produces a short burst of adjacent derivative spikes.
pub const DEFAULT_DEDUP_WINDOW: usize = 10;

/// Absolute first difference of each channel, phase-aligned so output index
/// `i` is the transition ending at input sample `i`.
///
/// Equivalent to convolving each channel with the kernel `[-1, 1]`, taking
/// absolute values and dropping the trailing sample: `out[0] = |x[0]|`
/// (implicit zero predecessor), `out[i] = |x[i] - x[i-1]|` for `i >= 1`.
/// Output length equals input length.
pub fn abs_derivative(block: &SampleBlock) -> Vec<Vec<f32>> {
    block
        .channels()
        .iter()
        .map(|samples| {
            let mut deriv = Vec::with_capacity(samples.len());
            let mut prev = 0.0f32;
            for &s in samples {
                deriv.push((s - prev).abs());
                prev = s;
            }
            deriv
        })
        .collect()
}

/// Per-channel ascending indices where the derivative strictly exceeds
/// `threshold`.
///
/// The first and last sample of each channel are excluded: the leading
/// difference is against an implicit zero and the trailing sample has no
/// successor, so both produce block-edge artifacts rather than real glitches.
pub fn scan_exceedances(deriv: &[Vec<f32>], threshold: f32) -> Vec<Vec<usize>> {
    deriv
        .iter()
        .map(|channel| {
            if channel.len() < 3 {
                return Vec::new();
            }
            channel[1..channel.len() - 1]
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > threshold)
                .map(|(i, _)| i + 1)
                .collect()
        })
        .collect()
}

/// Collapse clusters of nearby indices into a single leading index.
///
/// Sorts unique indices ascending, keeps the first, then keeps each
/// subsequent index only if it is at least `window` samples past the last
/// *kept* index. A slow decaying burst of spikes therefore collapses to its
/// leading timestamp, which is not guaranteed to be the peak of the burst.
/// Idempotent: merging the output again yields the same sequence.
pub fn merge_nearby(indices: &[usize], window: usize) -> Vec<usize> {
    if indices.is_empty() {
        return Vec::new();
    }
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut kept = Vec::with_capacity(sorted.len());
    kept.push(sorted[0]);
    for &idx in &sorted[1..] {
        if idx - kept[kept.len() - 1] >= window {
            kept.push(idx);
        }
    }
    kept
}

/// Scale the block so its largest absolute sample (across all channels)
/// becomes 1.0. An all-zero block is returned unchanged, never a division
/// by zero.
pub fn normalize(block: &mut SampleBlock) {
    let max_val = block
        .channels()
        .iter()
        .flat_map(|c| c.iter())
        .fold(0.0f32, |acc, &s| acc.max(s.abs()));

    if max_val == 0.0 {
        return;
    }

    for channel in block.channels_mut() {
        for sample in channel.iter_mut() {
            *sample /= max_val;
        }
    }
}

/// PCM sample width accepted from raw byte sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Int16,
    Int32,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            16 => Ok(Self::Int16),
            32 => Ok(Self::Int32),
            other => Err(SinewatchError::invalid(
                "bit_depth",
                format!("{other} (must be 16 or 32)"),
            )),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int32 => 4,
        }
    }

    /// Full-scale magnitude used to map integer PCM to [-1.0, 1.0].
    fn full_scale(self) -> f64 {
        match self {
            Self::Int16 => i16::MAX as f64,
            Self::Int32 => i32::MAX as f64,
        }
    }
}

/// Decode little-endian integer PCM bytes into interleaved f32 samples in
/// [-1.0, 1.0].
///
/// # Errors
/// `InvalidConfig` when the byte count is not a multiple of the sample width.
pub fn decode_interleaved(bytes: &[u8], bit_depth: BitDepth) -> Result<Vec<f32>> {
    let width = bit_depth.bytes();
    if bytes.len() % width != 0 {
        return Err(SinewatchError::invalid(
            "block",
            format!("{} bytes is not a whole number of {width}-byte samples", bytes.len()),
        ));
    }

    let full_scale = bit_depth.full_scale();
    let samples = bytes
        .chunks_exact(width)
        .map(|chunk| {
            let raw = match bit_depth {
                BitDepth::Int16 => i16::from_le_bytes([chunk[0], chunk[1]]) as f64,
                BitDepth::Int32 => {
                    i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                }
            };
            (raw / full_scale) as f32
        })
        .collect();
    Ok(samples)
}
