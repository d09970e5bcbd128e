//! Typed sample block passed between the readers and the detector.

/// A channels × frames block of normalized f32 samples at a known sample rate.
///
/// All channels hold the same number of frames. The detector never retains a
/// reference to a block past a single `detect` call; the caller owns it.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBlock {
    /// Build a block from per-channel sample vectors.
    ///
    /// Callers must supply equal-length channels; this is checked in debug
    /// builds only since every in-crate producer already guarantees it.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(
            channels.windows(2).all(|w| w[0].len() == w[1].len()),
            "all channels must have equal frame counts"
        );
        Self {
            channels,
            sample_rate,
        }
    }

    /// Split an interleaved sample slice (`L R L R ...`) into channels.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channels = (0..channel_count)
            .map(|c| samples.iter().skip(c).step_by(channel_count).copied().collect())
            .collect();
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        &self.channels[c]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}
