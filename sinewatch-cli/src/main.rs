//! sinewatch command-line front end.
//!
//! Batch mode (`-f file.wav`) scans a file block-by-block and prints every
//! glitch timestamp. Stream mode opens an input device and reports glitches
//! live until Ctrl+C.

mod args;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sinewatch_core::file::write_block_wav;
use sinewatch_core::stream::capture::list_input_devices;
use sinewatch_core::{scan_file, CaptureConfig, DetectorConfig, FileScanOptions, StreamDetector};

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = list_input_devices();
        if devices.is_empty() {
            println!("No input devices found.");
        }
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{marker}", device.name);
        }
        return Ok(());
    }

    match cli.filename.clone() {
        Some(path) => run_file_mode(&cli, path),
        None => run_stream_mode(&cli).await,
    }
}

fn run_file_mode(cli: &Cli, path: std::path::PathBuf) -> Result<()> {
    let options = FileScanOptions {
        threshold: cli.threshold,
        block_size: cli.block_size,
        overlap: cli.overlap,
        ..Default::default()
    };

    let started = Instant::now();
    let report = scan_file(&path, &options, |span, block, result| {
        if result.is_clean() {
            return;
        }
        info!(
            block = span.index,
            count = result.total_count,
            "glitches in block"
        );
        if cli.save_blocks {
            let out = cli.save_dir.join(format!("glitch_block_{:06}.wav", span.index));
            match write_block_wav(block, &out) {
                Ok(()) => info!(path = %out.display(), "saved glitch block"),
                Err(e) => warn!(path = %out.display(), error = %e, "failed to save block"),
            }
        }
    })
    .with_context(|| format!("failed to analyze {}", path.display()))?;

    println!("File: {}", path.display());
    println!(
        "{} Hz, {} channel(s), {:.2} s, {} blocks",
        report.sample_rate,
        report.channels,
        report.duration_secs(),
        report.block_count
    );
    println!("Number of discontinuities detected: {}", report.result.total_count);
    for &ms in &report.result.timestamps_ms {
        println!("  {}", format_timestamp(ms));
    }
    info!(elapsed = ?started.elapsed(), "file scan finished");
    Ok(())
}

async fn run_stream_mode(cli: &Cli) -> Result<()> {
    let format = CaptureConfig {
        sample_rate: cli.sample_rate,
        channels: cli.channels,
        bit_depth: cli.bit_depth,
        chunk_size: cli.chunk_size,
    };
    let config = DetectorConfig {
        threshold: cli.threshold,
        silence_threshold_db: cli.silence_threshold,
        save_blocks: cli.save_blocks,
        ..Default::default()
    };

    let detector = StreamDetector::new(format, config).context("invalid stream configuration")?;
    detector
        .open(cli.device.clone())
        .context("failed to open input device")?;

    let mut glitches = detector.subscribe_glitches();
    let printer = tokio::spawn(async move {
        while let Ok(event) = glitches.recv().await {
            println!(
                "Glitch detected in chunk {} (count {}). Total: {}",
                event.chunk_index, event.count, event.total
            );
        }
    });

    let started = Instant::now();
    detector.start()?;
    info!("audio processing started, Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    detector.close();
    // Give the capture loop one poll interval to notice and tear down.
    tokio::time::sleep(Duration::from_millis(150)).await;
    printer.abort();

    let elapsed = started.elapsed();
    println!(
        "Total discontinuities detected: {} in {}",
        detector.total_glitches(),
        format_timestamp(elapsed.as_secs_f64() * 1000.0)
    );

    if cli.save_blocks {
        for saved in detector.take_saved_blocks() {
            let name = format!("glitch_chunk_{:06}.wav", saved.chunk_index);
            let path = cli.save_dir.join(name);
            match write_block_wav(&saved.block, &path) {
                Ok(()) => info!(path = %path.display(), "saved glitch block"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to save block"),
            }
        }
    }

    Ok(())
}

/// `h:mm:ss.mmm`, matching the batch summary format.
fn format_timestamp(ms: f64) -> String {
    let total_ms = ms.round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;
    format!("{hours}:{minutes:02}:{seconds:02}.{millis:03}")
}
