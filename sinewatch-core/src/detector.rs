//! The block-level glitch detector: derivative → threshold scan →
//! channel-merge → windowed dedup → millisecond timestamps.

use serde::{Deserialize, Serialize};

use crate::block::SampleBlock;
use crate::dsp::{self, BitDepth, DEFAULT_DEDUP_WINDOW};
use crate::error::Result;

/// Detection threshold below which the derivative scan is known to report
/// noise-floor jitter as glitches. Not enforced, documented for callers.
pub const NOISY_THRESHOLD_FLOOR: f32 = 0.06;

/// Glitch positions found in one block (or one whole file).
///
/// `sample_indices` is ascending and duplicate-free; `timestamps_ms` is the
/// same sequence expressed as `index / sample_rate * 1000`. Immutable once
/// returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub sample_indices: Vec<usize>,
    pub timestamps_ms: Vec<f64>,
    pub total_count: usize,
}

impl DetectionResult {
    pub(crate) fn from_indices(indices: Vec<usize>, sample_rate: u32) -> Self {
        let timestamps_ms = indices
            .iter()
            .map(|&idx| sample_to_ms(idx, sample_rate))
            .collect();
        let total_count = indices.len();
        Self {
            sample_indices: indices,
            timestamps_ms,
            total_count,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.total_count == 0
    }
}

pub(crate) fn sample_to_ms(index: usize, sample_rate: u32) -> f64 {
    (index as f64 / sample_rate as f64) * 1000.0
}

/// Detects discontinuities in sinusoidal signals by thresholding the first
/// derivative of the waveform.
///
/// Stateless across calls: two `detect` calls never interact, so one
/// detector may be shared across threads as long as each call owns its own
/// block. Thresholds below [`NOISY_THRESHOLD_FLOOR`] are unreliable.
#[derive(Debug, Clone)]
pub struct GlitchDetector {
    sample_rate: u32,
    threshold: f32,
    dedup_window: usize,
}

impl GlitchDetector {
    pub fn new(sample_rate: u32, threshold: f32) -> Self {
        Self::with_dedup_window(sample_rate, threshold, DEFAULT_DEDUP_WINDOW)
    }

    pub fn with_dedup_window(sample_rate: u32, threshold: f32, dedup_window: usize) -> Self {
        Self {
            sample_rate,
            threshold,
            dedup_window,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Detect glitches in one block, indices relative to the block start.
    pub fn detect(&self, block: &SampleBlock) -> DetectionResult {
        let deriv = dsp::abs_derivative(block);
        let per_channel = dsp::scan_exceedances(&deriv, self.threshold);

        // One real glitch hits several adjacent samples and usually both
        // channels; merge everything into a single ascending sequence.
        let mut combined = Vec::new();
        for channel_hits in &per_channel {
            combined.extend_from_slice(channel_hits);
        }

        let merged = dsp::merge_nearby(&combined, self.dedup_window);
        DetectionResult::from_indices(merged, self.sample_rate)
    }

    /// Decode and analyze one raw PCM chunk: little-endian integer samples,
    /// channel-interleaved. The block is peak-normalized before detection,
    /// matching the live capture path.
    ///
    /// # Errors
    /// `InvalidConfig` when the byte count is not a whole number of samples.
    pub fn detect_raw(
        &self,
        bytes: &[u8],
        bit_depth: BitDepth,
        channels: usize,
    ) -> Result<DetectionResult> {
        let samples = dsp::decode_interleaved(bytes, bit_depth)?;
        let mut block = SampleBlock::from_interleaved(&samples, channels, self.sample_rate);
        dsp::normalize(&mut block);
        Ok(self.detect(&block))
    }

    /// Detect glitches with absolute frame positioning: every index is
    /// shifted by `frame_offset` before timestamps are derived. This is how
    /// block-local results become file- or stream-absolute.
    pub fn detect_with_offset(&self, block: &SampleBlock, frame_offset: usize) -> DetectionResult {
        let result = self.detect(block);
        let absolute: Vec<usize> = result
            .sample_indices
            .into_iter()
            .map(|idx| idx + frame_offset)
            .collect();
        DetectionResult::from_indices(absolute, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    /// Two-channel 48 kHz block: silence, then a full-scale 440 Hz tone
    /// entering at cosine phase, i.e. a unit-magnitude step at `step_frame`.
    fn step_block(frames: usize, step_frame: usize) -> SampleBlock {
        let channel: Vec<f32> = (0..frames)
            .map(|i| {
                if i < step_frame {
                    0.0
                } else {
                    (TAU * 440.0 * (i - step_frame) as f32 / 48_000.0).cos()
                }
            })
            .collect();
        SampleBlock::new(vec![channel.clone(), channel], 48_000)
    }

    fn sine_block(frames: usize, amplitude: f32, freq: f32, rate: u32) -> SampleBlock {
        let channel: Vec<f32> = (0..frames)
            .map(|i| amplitude * (TAU * freq * i as f32 / rate as f32).sin())
            .collect();
        SampleBlock::new(vec![channel.clone(), channel], rate)
    }

    #[test]
    fn unit_step_yields_exactly_one_hit_near_the_step() {
        let detector = GlitchDetector::new(48_000, 0.1);
        let result = detector.detect(&step_block(48_000, 24_000));

        assert_eq!(result.total_count, 1);
        let idx = result.sample_indices[0];
        assert!((23_999..=24_010).contains(&idx), "index {idx} out of range");
        assert_relative_eq!(result.timestamps_ms[0], 500.0, epsilon = 0.5);
    }

    #[test]
    fn continuous_sine_is_clean_at_any_rate() {
        let detector_48k = GlitchDetector::new(48_000, 0.1);
        let detector_44k = GlitchDetector::new(44_100, 0.1);

        assert!(detector_48k
            .detect(&sine_block(48_000, 0.9, 440.0, 48_000))
            .is_clean());
        assert!(detector_44k
            .detect(&sine_block(44_100, 0.9, 440.0, 44_100))
            .is_clean());
    }

    #[test]
    fn all_zero_block_is_clean() {
        let detector = GlitchDetector::new(48_000, 0.1);
        let block = SampleBlock::new(vec![vec![0.0; 1024]; 2], 48_000);
        assert!(detector.detect(&block).is_clean());
    }

    #[test]
    fn offset_shifts_every_index_linearly() {
        let detector = GlitchDetector::new(48_000, 0.1);
        let block = step_block(48_000, 24_000);

        let base = detector.detect(&block);
        for k in [0usize, 48, 48_000] {
            let shifted = detector.detect_with_offset(&block, k);
            let expected: Vec<usize> = base.sample_indices.iter().map(|&i| i + k).collect();
            assert_eq!(shifted.sample_indices, expected);
            assert_eq!(shifted.total_count, base.total_count);
        }
    }

    #[test]
    fn offset_timestamps_are_recomputed_from_absolute_indices() {
        let detector = GlitchDetector::new(48_000, 0.1);
        let result = detector.detect_with_offset(&step_block(48_000, 24_000), 48_000);
        // 24_000 + 48_000 frames at 48 kHz = 1500 ms.
        assert_relative_eq!(result.timestamps_ms[0], 1500.0, epsilon = 0.5);
    }

    #[test]
    fn indices_are_strictly_ascending_with_window_spacing() {
        // A noisy block with several impulse clusters.
        let mut channel = vec![0.0f32; 4_000];
        for &pos in &[100usize, 104, 700, 703, 705, 2_000, 3_500] {
            channel[pos] = 1.0;
            channel[pos + 1] = 0.0;
        }
        let block = SampleBlock::new(vec![channel], 48_000);
        let detector = GlitchDetector::new(48_000, 0.5);
        let result = detector.detect(&block);

        assert!(result
            .sample_indices
            .windows(2)
            .all(|w| w[1] - w[0] >= DEFAULT_DEDUP_WINDOW));
        assert!(!result.is_clean());
    }

    #[test]
    fn raw_pcm_bytes_are_decoded_normalized_and_detected() {
        // Mono 16-bit PCM: 500 zero samples, then a half-scale plateau.
        // Normalization lifts the step to full scale, so it must trip the
        // default threshold exactly once.
        let mut bytes = Vec::with_capacity(1_000 * 2);
        for i in 0..1_000u16 {
            let s: i16 = if i < 500 { 0 } else { 16_384 };
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let detector = GlitchDetector::new(48_000, 0.1);
        let result = detector
            .detect_raw(&bytes, BitDepth::Int16, 1)
            .expect("whole samples");
        assert_eq!(result.total_count, 1);
        assert_eq!(result.sample_indices[0], 500);
    }

    #[test]
    fn raw_pcm_rejects_ragged_byte_counts() {
        let detector = GlitchDetector::new(48_000, 0.1);
        assert!(detector.detect_raw(&[0x00], BitDepth::Int16, 1).is_err());
    }

    #[test]
    fn hits_shared_across_channels_are_reported_once() {
        let detector = GlitchDetector::new(48_000, 0.1);
        // Same step in both channels: result must contain it once.
        let result = detector.detect(&step_block(4_096, 2_048));
        assert_eq!(result.total_count, 1);
    }
}
