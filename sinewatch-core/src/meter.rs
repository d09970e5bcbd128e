//! Peak-hold VU meter used as the signal-presence gate.
//!
//! ## Read-and-clear protocol
//!
//! `update` records the per-channel peak magnitude seen since the last
//! readout; `read_peaks` converts the held peak to dB and clears the raw
//! accumulator. The gate therefore reports the level of exactly the samples
//! observed between two consecutive readouts, one readout per block.
//!
//! A zero raw peak never overwrites the previous dB value: silence keeps the
//! last valid reading instead of collapsing to -inf mid-session.

use crate::block::SampleBlock;

/// Default gate threshold: blocks whose every channel peaks below this are
/// skipped entirely, suppressing noise-floor false positives on silence.
pub const DEFAULT_SILENCE_THRESHOLD_DB: f32 = -40.0;

/// Per-channel rolling peak magnitude with peak-hold-then-clear semantics.
#[derive(Debug, Clone)]
pub struct PeakMeter {
    peak_raw: Vec<f32>,
    peak_db: Vec<f32>,
}

impl PeakMeter {
    /// Channels start at -inf dB, so the gate stays shut until the first
    /// non-silent block arrives.
    pub fn new(channels: usize) -> Self {
        Self {
            peak_raw: vec![0.0; channels],
            peak_db: vec![f32::NEG_INFINITY; channels],
        }
    }

    /// Fold a block's per-channel peak magnitudes into the held peaks.
    pub fn update(&mut self, block: &SampleBlock) {
        for (channel, held) in block.channels().iter().zip(self.peak_raw.iter_mut()) {
            let peak = channel.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
            if peak > *held {
                *held = peak;
            }
        }
    }

    /// Convert held peaks to dB (`20 * log10(peak)`), clear the raw
    /// accumulators and return the dB values.
    pub fn read_peaks(&mut self) -> Vec<f32> {
        for (raw, db) in self.peak_raw.iter_mut().zip(self.peak_db.iter_mut()) {
            if *raw > 0.0 {
                *db = 20.0 * raw.log10();
            }
            *raw = 0.0;
        }
        self.peak_db.clone()
    }

    /// Record and read out one block as a single transaction.
    ///
    /// The capture pipeline always goes through here so the two halves of
    /// the read-and-clear protocol cannot drift apart.
    pub fn measure(&mut self, block: &SampleBlock) -> Vec<f32> {
        self.update(block);
        self.read_peaks()
    }
}

/// True when every channel's dB reading is below `threshold_db`.
pub fn all_below(peaks_db: &[f32], threshold_db: f32) -> bool {
    peaks_db.iter().all(|&db| db < threshold_db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stereo(left: Vec<f32>, right: Vec<f32>) -> SampleBlock {
        SampleBlock::new(vec![left, right], 48_000)
    }

    #[test]
    fn full_scale_reads_zero_db() {
        let mut meter = PeakMeter::new(1);
        let peaks = meter.measure(&SampleBlock::from_mono(vec![0.0, -1.0, 0.5], 48_000));
        assert_relative_eq!(peaks[0], 0.0);
    }

    #[test]
    fn half_scale_reads_about_minus_six_db() {
        let mut meter = PeakMeter::new(1);
        let peaks = meter.measure(&SampleBlock::from_mono(vec![0.5], 48_000));
        assert_relative_eq!(peaks[0], -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn channels_are_tracked_independently() {
        let mut meter = PeakMeter::new(2);
        let peaks = meter.measure(&stereo(vec![1.0], vec![0.1]));
        assert_relative_eq!(peaks[0], 0.0);
        assert_relative_eq!(peaks[1], -20.0, epsilon = 1e-3);
    }

    #[test]
    fn readout_clears_held_peak() {
        let mut meter = PeakMeter::new(1);
        meter.measure(&SampleBlock::from_mono(vec![1.0], 48_000));
        // Next readout only sees the quieter block.
        let peaks = meter.measure(&SampleBlock::from_mono(vec![0.1], 48_000));
        assert_relative_eq!(peaks[0], -20.0, epsilon = 1e-3);
    }

    #[test]
    fn update_holds_peak_across_blocks_until_readout() {
        let mut meter = PeakMeter::new(1);
        meter.update(&SampleBlock::from_mono(vec![0.5], 48_000));
        meter.update(&SampleBlock::from_mono(vec![0.01], 48_000));
        let peaks = meter.read_peaks();
        assert_relative_eq!(peaks[0], -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn silence_keeps_previous_reading() {
        let mut meter = PeakMeter::new(1);
        meter.measure(&SampleBlock::from_mono(vec![0.5], 48_000));
        let peaks = meter.measure(&SampleBlock::from_mono(vec![0.0, 0.0], 48_000));
        assert_relative_eq!(peaks[0], -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn fresh_meter_gates_silence() {
        let mut meter = PeakMeter::new(2);
        let peaks = meter.measure(&stereo(vec![0.0; 4], vec![0.0; 4]));
        assert!(all_below(&peaks, DEFAULT_SILENCE_THRESHOLD_DB));
    }

    #[test]
    fn gate_opens_when_any_channel_is_loud() {
        let mut meter = PeakMeter::new(2);
        let peaks = meter.measure(&stereo(vec![0.0001], vec![0.5]));
        assert!(!all_below(&peaks, DEFAULT_SILENCE_THRESHOLD_DB));
    }
}
