//! End-to-end capture-loop session: feed synthetic chunks through the ring
//! buffer and verify glitch counting, gating and offsets across a whole run.

use std::f32::consts::TAU;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use sinewatch_core::events::GlitchEvent;
use sinewatch_core::stream::pipeline::{run, PipelineContext, PipelineDiagnostics};
use sinewatch_core::stream::saved::SavedBlocks;
use sinewatch_core::stream::state::{RunState, SharedRunState};
use sinewatch_core::stream::{create_audio_ring, CaptureConfig, DetectorConfig, Producer};

const CHUNK: usize = 1_024;
const RATE: u32 = 48_000;

fn format() -> CaptureConfig {
    CaptureConfig {
        sample_rate: RATE,
        channels: 2,
        bit_depth: 32,
        chunk_size: CHUNK,
    }
}

/// Stereo interleaved chunk of a 440 Hz tone at `amplitude`, with a hard
/// polarity flip at `glitch_at` (a real-world phase-break artifact).
fn tone_chunk(amplitude: f32, glitch_at: Option<usize>) -> Vec<f32> {
    let mut data = Vec::with_capacity(CHUNK * 2);
    for i in 0..CHUNK {
        let sign = if matches!(glitch_at, Some(g) if i >= g) {
            -1.0
        } else {
            1.0
        };
        let value = sign * amplitude * (TAU * 440.0 * i as f32 / RATE as f32).cos();
        data.push(value);
        data.push(value);
    }
    data
}

fn recv_glitch(
    rx: &mut broadcast::Receiver<GlitchEvent>,
    timeout: Duration,
) -> Option<GlitchEvent> {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return Some(ev),
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    return None;
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}

#[test]
fn session_counts_glitches_across_chunks_and_gates_silence() {
    let (mut producer, consumer) = create_audio_ring();

    // Chunk 0: clean tone. Chunk 1: phase flip at frame 218 (near a cosine
    // peak, so the jump is close to 2x amplitude).
    // Chunk 2: noise-floor chunk (gated). Chunk 3: phase flip at frame 700.
    producer.push_slice(&tone_chunk(0.9, None));
    producer.push_slice(&tone_chunk(0.9, Some(218)));
    producer.push_slice(&tone_chunk(0.0001, None));
    producer.push_slice(&tone_chunk(0.9, Some(700)));

    let state = SharedRunState::new();
    state.set(RunState::Running);

    let (glitch_tx, mut glitch_rx) = broadcast::channel(64);
    let (level_tx, _level_rx) = broadcast::channel(64);
    let total = Arc::new(AtomicU64::new(0));
    let diagnostics = Arc::new(PipelineDiagnostics::default());

    let ctx = PipelineContext {
        format: format(),
        config: DetectorConfig::default(),
        consumer,
        state: state.clone(),
        glitch_tx,
        level_tx,
        total_glitches: Arc::clone(&total),
        levels: Arc::new(Mutex::new(Vec::new())),
        saved_blocks: Arc::new(Mutex::new(SavedBlocks::new(8))),
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::clone(&diagnostics),
    };

    let handle = thread::spawn(move || run(ctx));

    let first = recv_glitch(&mut glitch_rx, Duration::from_secs(2)).expect("first glitch");
    let second = recv_glitch(&mut glitch_rx, Duration::from_secs(2)).expect("second glitch");

    state.set(RunState::Closed);
    handle.join().expect("capture loop panicked");

    // The phase flips land in chunks 1 and 3; the gated noise chunk in
    // between must produce nothing.
    assert_eq!(first.chunk_index, 1);
    assert_eq!(second.chunk_index, 3);
    assert_eq!(first.count, 1);
    assert_eq!(second.count, 1);
    assert_eq!(second.total, 2);
    assert_eq!(total.load(Ordering::Relaxed), 2);

    let snap = diagnostics.snapshot();
    assert_eq!(snap.chunks_processed, 4);
    assert_eq!(snap.chunks_gated, 1);
    assert_eq!(snap.glitch_chunks, 2);
}

#[test]
fn pause_defers_processing_until_resume() {
    let (mut producer, consumer) = create_audio_ring();
    producer.push_slice(&tone_chunk(0.9, Some(512)));

    let state = SharedRunState::new(); // Idle: loop parks on the poll interval

    let (glitch_tx, mut glitch_rx) = broadcast::channel(64);
    let (level_tx, _level_rx) = broadcast::channel(64);

    let ctx = PipelineContext {
        format: format(),
        config: DetectorConfig::default(),
        consumer,
        state: state.clone(),
        glitch_tx,
        level_tx,
        total_glitches: Arc::new(AtomicU64::new(0)),
        levels: Arc::new(Mutex::new(Vec::new())),
        saved_blocks: Arc::new(Mutex::new(SavedBlocks::new(8))),
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::new(PipelineDiagnostics::default()),
    };

    let handle = thread::spawn(move || run(ctx));

    assert!(
        recv_glitch(&mut glitch_rx, Duration::from_millis(250)).is_none(),
        "idle loop must not consume chunks"
    );

    state.set(RunState::Running);
    let event = recv_glitch(&mut glitch_rx, Duration::from_secs(2)).expect("glitch after resume");
    assert_eq!(event.chunk_index, 0);

    state.set(RunState::Closed);
    handle.join().expect("capture loop panicked");
}
