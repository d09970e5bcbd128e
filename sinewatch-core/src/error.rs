use thiserror::Error;

/// All errors produced by sinewatch-core.
#[derive(Debug, Error)]
pub enum SinewatchError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("invalid {param}: {detail}")]
    InvalidConfig {
        param: &'static str,
        detail: String,
    },

    #[error("wav decode error: {0}")]
    Decode(#[from] hound::Error),

    #[error("stream is already open")]
    AlreadyOpen,

    #[error("stream is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SinewatchError {
    pub(crate) fn invalid(param: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            param,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SinewatchError>;
