//! Blocking capture-loop body.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Observe run state: Closed → exit; Idle/Paused → poll-sleep, re-check
//! 2. Take exactly chunk_size frames from the SPSC ring
//! 3. Deinterleave → SampleBlock; meter.measure (read-and-clear)
//! 4. Gate: all channels below the silence threshold → skip analysis
//! 5. Normalize, detect with frame_offset = chunk_index * chunk_size
//! 6. Nonzero count → GlitchEvent broadcast + bounded saved-block append
//! ```
//!
//! The loop runs inside `spawn_blocking`, keeping the Tokio executor free.
//! There is exactly one loop per open stream; it is the sole owner of the
//! meter and the chunk counter. A shared mutex only guards the level
//! snapshot and the saved-block buffer read from the caller side.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::block::SampleBlock;
use crate::detector::GlitchDetector;
use crate::dsp;
use crate::events::{GlitchEvent, LevelEvent};
use crate::meter::{self, PeakMeter};
use crate::stream::saved::{SavedBlock, SavedBlocks};
use crate::stream::state::{RunState, SharedRunState};
use crate::stream::{AudioConsumer, CaptureConfig, Consumer, DetectorConfig};

/// How long the loop sleeps between run-state checks while Idle or Paused.
/// Pause/resume latency is bounded by this interval.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep while waiting for the ring to fill one chunk. Together with the
/// blocking pop this stands in for the device's blocking read; the loop
/// stalls for roughly `chunk_size / sample_rate` per chunk.
const RING_WAIT: Duration = Duration::from_millis(5);

/// Counters for observability; shared with the engine handle.
#[derive(Debug, Default)]
pub struct PipelineDiagnostics {
    pub chunks_processed: AtomicUsize,
    pub chunks_gated: AtomicUsize,
    pub glitch_chunks: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_processed.store(0, Ordering::Relaxed);
        self.chunks_gated.store(0, Ordering::Relaxed);
        self.glitch_chunks.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_gated: self.chunks_gated.load(Ordering::Relaxed),
            glitch_chunks: self.glitch_chunks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub chunks_processed: usize,
    pub chunks_gated: usize,
    pub glitch_chunks: usize,
}

/// All context the capture loop needs, passed as one struct so the
/// `spawn_blocking` closure stays tidy.
pub struct PipelineContext {
    pub format: CaptureConfig,
    pub config: DetectorConfig,
    pub consumer: AudioConsumer,
    pub state: SharedRunState,
    pub glitch_tx: broadcast::Sender<GlitchEvent>,
    pub level_tx: broadcast::Sender<LevelEvent>,
    /// Cumulative session tally, shared with the caller/UI thread.
    pub total_glitches: Arc<AtomicU64>,
    /// Latest per-channel peak dB snapshot for the caller/UI thread.
    pub levels: Arc<Mutex<Vec<f32>>>,
    pub saved_blocks: Arc<Mutex<SavedBlocks>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking capture loop until the run state reaches `Closed`.
pub fn run(mut ctx: PipelineContext) {
    let channels = ctx.format.channels as usize;
    let chunk_samples = ctx.format.chunk_size * channels;

    let detector = GlitchDetector::with_dedup_window(
        ctx.format.sample_rate,
        ctx.config.threshold,
        ctx.config.dedup_window,
    );
    let mut meter = PeakMeter::new(channels);

    // Scratch chunk, reused each iteration. `filled` carries a partially
    // assembled chunk across iterations (and across pauses).
    let mut raw = vec![0f32; chunk_samples];
    let mut filled = 0usize;
    let mut chunk_index: u64 = 0;

    info!(
        sample_rate = ctx.format.sample_rate,
        channels,
        chunk_size = ctx.format.chunk_size,
        threshold = ctx.config.threshold,
        silence_threshold_db = ctx.config.silence_threshold_db,
        "capture loop started"
    );

    loop {
        match ctx.state.get() {
            RunState::Closed => break,
            RunState::Idle | RunState::Paused => {
                std::thread::sleep(PAUSE_POLL_INTERVAL);
                continue;
            }
            RunState::Running => {}
        }

        // ── Assemble exactly one chunk from the ring ─────────────────────
        filled += ctx.consumer.pop_slice(&mut raw[filled..]);
        if filled < chunk_samples {
            std::thread::sleep(RING_WAIT);
            continue;
        }
        filled = 0;

        let frame_offset = chunk_index as usize * ctx.format.chunk_size;
        chunk_index += 1;
        ctx.diagnostics
            .chunks_processed
            .fetch_add(1, Ordering::Relaxed);

        let mut block =
            SampleBlock::from_interleaved(&raw, channels, ctx.format.sample_rate);

        // ── Meter + signal gate ──────────────────────────────────────────
        let peaks_db = meter.measure(&block);
        *ctx.levels.lock() = peaks_db.clone();
        let gated = meter::all_below(&peaks_db, ctx.config.silence_threshold_db);

        let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
        let _ = ctx.level_tx.send(LevelEvent {
            seq,
            peaks_db,
            gated,
        });

        if gated {
            // No real signal present: skip analysis entirely so the
            // noise floor cannot trip the derivative threshold.
            ctx.diagnostics.chunks_gated.fetch_add(1, Ordering::Relaxed);
            trace!(chunk = chunk_index - 1, "chunk below silence gate");
            continue;
        }

        // ── Detect ───────────────────────────────────────────────────────
        dsp::normalize(&mut block);
        let result = detector.detect_with_offset(&block, frame_offset);

        if result.total_count > 0 {
            ctx.diagnostics.glitch_chunks.fetch_add(1, Ordering::Relaxed);
            let total = ctx
                .total_glitches
                .fetch_add(result.total_count as u64, Ordering::Relaxed)
                + result.total_count as u64;

            debug!(
                chunk = chunk_index - 1,
                count = result.total_count,
                total,
                first_ms = result.timestamps_ms.first().copied().unwrap_or(0.0),
                "glitches detected"
            );

            let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
            let _ = ctx.glitch_tx.send(GlitchEvent {
                seq,
                chunk_index: chunk_index - 1,
                count: result.total_count,
                total,
            });

            if ctx.config.save_blocks {
                ctx.saved_blocks.lock().push(SavedBlock {
                    chunk_index: chunk_index - 1,
                    frame_offset,
                    block,
                });
            }
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        chunks_processed = snap.chunks_processed,
        chunks_gated = snap.chunks_gated,
        glitch_chunks = snap.glitch_chunks,
        total_glitches = ctx.total_glitches.load(Ordering::Relaxed),
        "capture loop stopped"
    );
}
