//! Batch mode: block-based glitch detection over a `.wav` file.
//!
//! The file is decoded up front, segmented with a [`BlockPlan`] and fed
//! block-by-block to the detector with absolute frame offsets. Because the
//! overlap region is analyzed twice (tail of block *k*, head of block
//! *k+1*), the same glitch can be reported at the same absolute index by
//! two blocks; the final global sort + unique pass removes those exact
//! duplicates. Any decode failure aborts the whole run; there is no
//! partial recovery for a corrupt source.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::block::SampleBlock;
use crate::detector::{DetectionResult, GlitchDetector};
use crate::dsp::DEFAULT_DEDUP_WINDOW;
use crate::error::{Result, SinewatchError};
use crate::segment::{BlockPlan, BlockSpan};

/// Options for [`scan_file`].
#[derive(Debug, Clone)]
pub struct FileScanOptions {
    /// Derivative threshold. Values below ~0.06 are noisy.
    pub threshold: f32,
    /// Frames per analysis block. `None` uses one second of audio
    /// (the file's sample rate).
    pub block_size: Option<usize>,
    /// Frames shared between consecutive blocks. `None` uses one
    /// millisecond of audio (`sample_rate / 1000`).
    pub overlap: Option<usize>,
    /// Minimum spacing between reported glitches within one block.
    pub dedup_window: usize,
}

impl Default for FileScanOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            block_size: None,
            overlap: None,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub sample_rate: u32,
    pub channels: usize,
    pub total_frames: usize,
    pub block_count: usize,
    /// File-absolute indices after the global sort + unique pass.
    pub result: DetectionResult,
}

impl FileReport {
    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }
}

/// Scan a `.wav` file for glitches.
///
/// `on_block` is invoked once per analyzed block with its span, the decoded
/// samples and the detection result (already offset to absolute indices);
/// progress reporting and persistence of glitch-bearing blocks (via
/// [`write_block_wav`]) hook in here.
///
/// # Errors
/// Fails fast if the file cannot be opened or decoded, or if the resolved
/// overlap is not smaller than the block size.
pub fn scan_file(
    path: impl AsRef<Path>,
    options: &FileScanOptions,
    mut on_block: impl FnMut(BlockSpan, &SampleBlock, &DetectionResult),
) -> Result<FileReport> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channel_count = spec.channels as usize;

    let channels = decode_channels(reader)?;
    let total_frames = channels.first().map_or(0, Vec::len);

    let block_size = options.block_size.unwrap_or(spec.sample_rate as usize);
    let overlap = options
        .overlap
        .unwrap_or((spec.sample_rate / 1000) as usize);
    let plan = BlockPlan::new(total_frames, block_size, overlap)?;

    info!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = channel_count,
        total_frames,
        block_size,
        overlap,
        blocks = plan.block_count(),
        "scanning file"
    );

    let detector = GlitchDetector::with_dedup_window(
        spec.sample_rate,
        options.threshold,
        options.dedup_window,
    );

    let mut all_indices: Vec<usize> = Vec::new();
    for span in plan.iter() {
        let block = SampleBlock::new(
            channels
                .iter()
                .map(|c| c[span.start..span.start + span.len].to_vec())
                .collect(),
            spec.sample_rate,
        );
        let result = detector.detect_with_offset(&block, span.start);
        if !result.is_clean() {
            debug!(block = span.index, count = result.total_count, "block hits");
        }
        all_indices.extend_from_slice(&result.sample_indices);
        on_block(span, &block, &result);
    }

    // Remove exact duplicates from the twice-analyzed overlap regions and
    // sort low to high. Deliberately not a second windowed dedup: indices a
    // few samples apart across a boundary stay separate.
    all_indices.sort_unstable();
    all_indices.dedup();

    Ok(FileReport {
        sample_rate: spec.sample_rate,
        channels: channel_count,
        total_frames,
        block_count: plan.block_count(),
        result: DetectionResult::from_indices(all_indices, spec.sample_rate),
    })
}

/// Decode every frame into per-channel f32 vectors in [-1.0, 1.0].
fn decode_channels<R: std::io::Read>(mut reader: WavReader<R>) -> Result<Vec<Vec<f32>>> {
    let spec = reader.spec();
    let channel_count = spec.channels as usize;
    if channel_count == 0 {
        return Err(SinewatchError::invalid(
            "channels",
            "file reports zero channels",
        ));
    }
    let mut channels = vec![Vec::new(); channel_count];

    match spec.sample_format {
        SampleFormat::Float => {
            for (i, sample) in reader.samples::<f32>().enumerate() {
                channels[i % channel_count].push(sample?);
            }
        }
        SampleFormat::Int => {
            let full_scale = ((1i64 << (spec.bits_per_sample - 1)) - 1) as f64;
            for (i, sample) in reader.samples::<i32>().enumerate() {
                channels[i % channel_count].push((sample? as f64 / full_scale) as f32);
            }
        }
    }
    Ok(channels)
}

/// Persist one block as a 16-bit PCM `.wav` (used for saved glitch blocks).
pub fn write_block_wav(block: &SampleBlock, path: impl AsRef<Path>) -> Result<()> {
    let spec = WavSpec {
        channels: block.channel_count() as u16,
        sample_rate: block.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for frame in 0..block.frames() {
        for channel in block.channels() {
            let s = (channel[frame].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(s)?;
        }
    }
    writer.finalize()?;
    Ok(())
}
