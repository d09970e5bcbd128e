use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sinewatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect glitches and discontinuities in sinusoidal audio signals")]
pub struct Cli {
    /// Audio file to analyze (batch mode). Without this, sinewatch
    /// monitors a live input device.
    #[arg(short, long)]
    pub filename: Option<PathBuf>,

    /// Discontinuity detection threshold. Values below ~0.06 are noisy.
    #[arg(short, long, default_value_t = 0.1)]
    pub threshold: f32,

    /// Sample rate for stream mode (Hz).
    #[arg(short = 'r', long, default_value_t = 48_000)]
    pub sample_rate: u32,

    /// Channel count for stream mode.
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=2))]
    pub channels: u16,

    /// Source bit depth for stream mode.
    #[arg(long, default_value_t = 32)]
    pub bit_depth: u16,

    /// Frames per capture chunk in stream mode.
    #[arg(long, default_value_t = 1_024)]
    pub chunk_size: usize,

    /// Frames per analysis block in file mode (default: one second).
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Frames shared between consecutive file blocks (default: one
    /// millisecond).
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Silence gate in dBFS: stream chunks below this on every channel are
    /// skipped.
    #[arg(long, default_value_t = -40.0, allow_negative_numbers = true)]
    pub silence_threshold: f32,

    /// Write glitch-bearing blocks as .wav files: per block during a file
    /// scan, drained on exit in stream mode.
    #[arg(short, long)]
    pub save_blocks: bool,

    /// Directory for saved glitch blocks.
    #[arg(long, default_value = ".")]
    pub save_dir: PathBuf,

    /// Input device name for stream mode (default: system default input).
    #[arg(short, long)]
    pub device: Option<String>,

    /// List available input devices and exit.
    #[arg(long)]
    pub list_devices: bool,
}
