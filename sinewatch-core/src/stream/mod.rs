//! Live capture mode: one cpal input stream feeding the glitch detector.
//!
//! ## Lifecycle
//!
//! ```text
//! StreamDetector::new(format, config)    (validates eagerly)
//!     └─► open()      → device acquired, capture loop spawned, state Idle
//!         └─► start() → state Running, chunks analyzed
//!             └─► stop()  → state Paused (device stays open)
//!             └─► close() → state Closed, loop tears down exactly once
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the device is opened
//! *inside* the `spawn_blocking` closure and never crosses a thread
//! boundary. A sync channel propagates open-device errors back to the
//! `open()` caller. Control methods only flip the shared run state; the
//! loop observes it once per iteration.

pub mod capture;
pub mod pipeline;
pub mod saved;
pub mod state;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use ringbuf::{traits::Split, HeapRb};
use tokio::sync::broadcast;
use tracing::info;

use crate::dsp::DEFAULT_DEDUP_WINDOW;
use crate::error::{Result, SinewatchError};
use crate::events::{GlitchEvent, LevelEvent, StatusEvent};
use crate::meter::DEFAULT_SILENCE_THRESHOLD_DB;
use crate::stream::capture::InputCapture;
use crate::stream::pipeline::{DiagnosticsSnapshot, PipelineContext, PipelineDiagnostics};
use crate::stream::saved::{SavedBlock, SavedBlocks, DEFAULT_SAVED_BLOCK_CAPACITY};
use crate::stream::state::{RunState, SharedRunState};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the cpal callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture loop.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^20 = 1 048 576 f32 samples ≈ 10.9 s of stereo at 48 kHz.
/// Plenty of headroom for pipeline hiccups without dropping callback data.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Broadcast channel capacity for glitch/level/status events.
const BROADCAST_CAP: usize = 256;

/// Immutable capture format, validated once at stream setup.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    /// PCM width of the source: 16 or 32.
    pub bit_depth: u16,
    /// Frames per analysis chunk.
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 32,
            chunk_size: 1_024,
        }
    }
}

impl CaptureConfig {
    /// # Errors
    /// `InvalidConfig` naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SinewatchError::invalid("sample_rate", "must be positive"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(SinewatchError::invalid(
                "channels",
                format!("{} (must be 1 or 2)", self.channels),
            ));
        }
        if !matches!(self.bit_depth, 16 | 32) {
            return Err(SinewatchError::invalid(
                "bit_depth",
                format!("{} (must be 16 or 32)", self.bit_depth),
            ));
        }
        if self.chunk_size == 0 {
            return Err(SinewatchError::invalid("chunk_size", "must be positive"));
        }
        Ok(())
    }
}

/// Detection tuning for stream mode.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Derivative threshold. Values below ~0.06 are noisy.
    pub threshold: f32,
    /// Gate: chunks whose every channel peaks below this (dBFS) are skipped.
    pub silence_threshold_db: f32,
    /// Minimum spacing between reported glitches within one chunk.
    pub dedup_window: usize,
    /// Retain glitch-bearing chunks for later persistence.
    pub save_blocks: bool,
    /// Bounded capacity of the saved-block buffer.
    pub saved_block_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            save_blocks: false,
            saved_block_capacity: DEFAULT_SAVED_BLOCK_CAPACITY,
        }
    }
}

/// Live glitch detector over one audio input stream.
///
/// `StreamDetector` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc` to share between the control surface and event consumers.
pub struct StreamDetector {
    format: CaptureConfig,
    config: DetectorConfig,
    run_state: SharedRunState,
    /// Guards against spawning a second capture loop.
    opened: AtomicBool,
    glitch_tx: broadcast::Sender<GlitchEvent>,
    level_tx: broadcast::Sender<LevelEvent>,
    status_tx: broadcast::Sender<StatusEvent>,
    total_glitches: Arc<AtomicU64>,
    levels: Arc<Mutex<Vec<f32>>>,
    saved_blocks: Arc<Mutex<SavedBlocks>>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl StreamDetector {
    /// Create a detector. Does not touch the device; call `open()` next.
    ///
    /// # Errors
    /// `InvalidConfig` if the capture format is unsupported.
    pub fn new(format: CaptureConfig, config: DetectorConfig) -> Result<Self> {
        format.validate()?;
        let (glitch_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (level_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let saved_blocks = Arc::new(Mutex::new(SavedBlocks::new(config.saved_block_capacity)));

        Ok(Self {
            format,
            config,
            run_state: SharedRunState::new(),
            opened: AtomicBool::new(false),
            glitch_tx,
            level_tx,
            status_tx,
            total_glitches: Arc::new(AtomicU64::new(0)),
            levels: Arc::new(Mutex::new(vec![
                f32::NEG_INFINITY;
                usize::from(format.channels)
            ])),
            saved_blocks,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    /// Acquire the input device and spawn the capture loop.
    ///
    /// Blocks until the device is confirmed open (or failed), then returns;
    /// the loop keeps running in a background blocking thread until
    /// `close()`. The stream starts in `Idle`; call `start()` to begin
    /// analysis.
    ///
    /// # Errors
    /// - `AlreadyOpen` if a capture loop was already spawned.
    /// - `Closed` after `close()`.
    /// - Device errors from cpal propagate unchanged.
    pub fn open(&self, preferred_device: Option<String>) -> Result<()> {
        if self.run_state.is_closed() {
            return Err(SinewatchError::Closed);
        }
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(SinewatchError::AlreadyOpen);
        }

        self.diagnostics.reset();
        let (producer, consumer) = create_audio_ring();

        let format = self.format;
        let config = self.config.clone();
        let run_state = self.run_state.clone();
        let glitch_tx = self.glitch_tx.clone();
        let level_tx = self.level_tx.clone();
        let total_glitches = Arc::clone(&self.total_glitches);
        let levels = Arc::clone(&self.levels);
        let saved_blocks = Arc::clone(&self.saved_blocks);
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync channel: the loop thread confirms device open to this caller.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || {
            // Device must be opened on THIS thread: cpal::Stream is !Send.
            let capture = match InputCapture::open(
                producer,
                run_state.clone(),
                &format,
                preferred_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(()));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    run_state.set(RunState::Closed);
                    return;
                }
            };

            pipeline::run(PipelineContext {
                format,
                config,
                consumer,
                state: run_state,
                glitch_tx,
                level_tx,
                total_glitches,
                levels,
                saved_blocks,
                seq,
                diagnostics,
            });

            // Stream drops here, releasing the device on this thread.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.emit_status(None);
                info!("stream open, idle until start()");
                Ok(())
            }
            Ok(Err(e)) => {
                self.run_state.set(RunState::Closed);
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message: the blocking task died.
                self.run_state.set(RunState::Closed);
                Err(SinewatchError::Other(anyhow::anyhow!(
                    "capture task died before confirming device open"
                )))
            }
        }
    }

    /// Begin (or resume) analysis. Only flips the run flag; takes effect on
    /// the loop's next iteration.
    pub fn start(&self) -> Result<()> {
        if self.run_state.is_closed() {
            return Err(SinewatchError::Closed);
        }
        self.run_state.set(RunState::Running);
        self.emit_status(None);
        Ok(())
    }

    /// Pause analysis without tearing down the device. Resume latency after
    /// `start()` is bounded by [`pipeline::PAUSE_POLL_INTERVAL`].
    pub fn stop(&self) -> Result<()> {
        if self.run_state.is_closed() {
            return Err(SinewatchError::Closed);
        }
        self.run_state.set(RunState::Paused);
        self.emit_status(None);
        Ok(())
    }

    /// Tear the stream down. Idempotent; the capture loop releases the
    /// device and exits on its next iteration.
    pub fn close(&self) {
        self.run_state.set(RunState::Closed);
        self.emit_status(None);
        info!("stream close requested");
    }

    /// Clear the saved-block buffer. Run state is unaffected.
    pub fn reset(&self) {
        self.saved_blocks.lock().clear();
    }

    pub fn state(&self) -> RunState {
        self.run_state.get()
    }

    /// Cumulative glitch tally for this session.
    pub fn total_glitches(&self) -> u64 {
        self.total_glitches.load(Ordering::Relaxed)
    }

    /// Latest per-channel peak dB snapshot (read-only view for a UI).
    pub fn levels(&self) -> Vec<f32> {
        self.levels.lock().clone()
    }

    /// Drain the retained glitch blocks.
    pub fn take_saved_blocks(&self) -> Vec<SavedBlock> {
        self.saved_blocks.lock().drain()
    }

    pub fn subscribe_glitches(&self) -> broadcast::Receiver<GlitchEvent> {
        self.glitch_tx.subscribe()
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelEvent> {
        self.level_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn emit_status(&self, detail: Option<String>) {
        let _ = self.status_tx.send(StatusEvent {
            state: self.run_state.get(),
            detail,
        });
    }
}
