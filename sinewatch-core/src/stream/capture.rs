//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate past its scratch buffer, block on a mutex, or
//! perform I/O. The callback only converts samples to f32 and writes them
//! into a lock-free SPSC ring buffer producer; all analysis happens on the
//! pipeline thread.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `InputCapture` therefore must be created and dropped on the same
//! thread. The pipeline accomplishes this by opening the device inside
//! `spawn_blocking`.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::error::{Result, SinewatchError};
use crate::stream::state::SharedRunState;
use crate::stream::{AudioProducer, CaptureConfig};

#[cfg(feature = "audio-cpal")]
use crate::stream::Producer;

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Metadata about an audio input device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// List all available audio input devices on the system.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::HostTrait;

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Handle to an active input stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct InputCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
}

impl InputCapture {
    /// Open an input device by preferred name, falling back to the system
    /// default input device.
    ///
    /// The stream is requested with the exact channel count and sample rate
    /// from `config`; samples are converted to interleaved f32 in
    /// [-1.0, 1.0] and pushed into `producer` only while the shared state is
    /// `Running`; paused and idle chunks are discarded at the source.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when no input exists, `AudioStream` when cpal
    /// rejects the requested configuration or sample format.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        mut producer: AudioProducer,
        state: SharedRunState,
        config: &CaptureConfig,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected_device.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = match selected_device.or_else(|| host.default_input_device()) {
            Some(d) => d,
            None => return Err(SinewatchError::NoDefaultInputDevice),
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SinewatchError::AudioDevice(e.to_string()))?;

        // Ask the device for a format matching the configured bit depth;
        // fall back to its default when no supported range matches.
        let requested = requested_format(config.bit_depth);
        let sample_format = device
            .supported_input_configs()
            .ok()
            .and_then(|mut ranges| {
                ranges.find(|r| {
                    r.sample_format() == requested
                        && r.channels() == config.channels
                        && r.min_sample_rate() <= SampleRate(config.sample_rate)
                        && r.max_sample_rate() >= SampleRate(config.sample_rate)
                })
            })
            .map(|r| r.sample_format())
            .unwrap_or_else(|| supported.sample_format());
        if sample_format != requested {
            warn!(
                bit_depth = config.bit_depth,
                format = ?sample_format,
                "requested bit depth not supported, using the device format"
            );
        }

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let state_f32 = state.clone();
        let state_i16 = state.clone();
        let state_i32 = state;

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _info| {
                    if !state_f32.is_running() {
                        return;
                    }
                    let written = producer.push_slice(data);
                    if written < data.len() {
                        warn!("ring buffer full: dropped {} samples", data.len() - written);
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),

            SampleFormat::I16 => {
                let mut conv_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _info| {
                        if !state_i16.is_running() {
                            return;
                        }
                        conv_buf.resize(data.len(), 0.0);
                        for (out, &s) in conv_buf.iter_mut().zip(data) {
                            *out = s as f32 / i16::MAX as f32;
                        }
                        let written = producer.push_slice(&conv_buf);
                        if written < conv_buf.len() {
                            warn!(
                                "ring buffer full: dropped {} samples",
                                conv_buf.len() - written
                            );
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I32 => {
                let mut conv_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i32], _info| {
                        if !state_i32.is_running() {
                            return;
                        }
                        conv_buf.resize(data.len(), 0.0);
                        for (out, &s) in conv_buf.iter_mut().zip(data) {
                            *out = (s as f64 / i32::MAX as f64) as f32;
                        }
                        let written = producer.push_slice(&conv_buf);
                        if written < conv_buf.len() {
                            warn!(
                                "ring buffer full: dropped {} samples",
                                conv_buf.len() - written
                            );
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(SinewatchError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| SinewatchError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SinewatchError::AudioStream(e.to_string()))?;

        Ok(Self { _stream: stream })
    }
}

/// Stream format to request for a configured bit depth. 16-bit sources map
/// to `I16`; everything else captures as `F32` and is already full scale.
#[cfg(feature = "audio-cpal")]
fn requested_format(bit_depth: u16) -> SampleFormat {
    match bit_depth {
        16 => SampleFormat::I16,
        _ => SampleFormat::F32,
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl InputCapture {
    pub fn open(
        _producer: AudioProducer,
        _state: SharedRunState,
        _config: &CaptureConfig,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(SinewatchError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(all(test, feature = "audio-cpal"))]
mod tests {
    use super::*;

    #[test]
    fn bit_depth_selects_matching_stream_format() {
        assert_eq!(requested_format(16), SampleFormat::I16);
        assert_eq!(requested_format(32), SampleFormat::F32);
    }
}
