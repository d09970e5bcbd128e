//! # sinewatch-core
//!
//! Glitch/discontinuity detection for sinusoidal audio signals.
//!
//! ## Architecture
//!
//! ```text
//! batch:   .wav file → BlockPlan → SampleBlock ─┐
//!                                               ├─► GlitchDetector
//! stream:  Microphone → SPSC RingBuffer ────────┘        │
//!            (cpal callback)   (capture loop)     derivative → threshold
//!                                                 → dedup → timestamps
//!                                                        │
//!                                         broadcast::Sender<GlitchEvent>
//! ```
//!
//! The detector flags samples whose first derivative exceeds a threshold,
//! collapses adjacent spikes into one glitch, and reports absolute sample
//! indices with millisecond timestamps. Both modes share the same per-block
//! algorithm; stream mode adds a peak-meter gate that skips silent chunks.
//!
//! The cpal callback is lock-free and allocation-light; all analysis
//! happens on the capture-loop thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod block;
pub mod detector;
pub mod dsp;
pub mod error;
pub mod events;
pub mod file;
pub mod meter;
pub mod segment;
pub mod stream;

// Convenience re-exports for downstream crates
pub use block::SampleBlock;
pub use detector::{DetectionResult, GlitchDetector};
pub use error::SinewatchError;
pub use events::{GlitchEvent, LevelEvent, StatusEvent};
pub use file::{scan_file, FileReport, FileScanOptions};
pub use meter::PeakMeter;
pub use segment::{BlockPlan, BlockSpan};
pub use stream::{CaptureConfig, DetectorConfig, StreamDetector};
pub use stream::state::RunState;
