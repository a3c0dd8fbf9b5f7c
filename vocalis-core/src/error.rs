use thiserror::Error;

/// All errors produced by vocalis-core.
///
/// The estimation math never produces an error: degenerate input yields
/// "no pitch" (frequency 0) instead.
#[derive(Debug, Error)]
pub enum VocalisError {
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("audio capture unavailable: compiled without the audio-cpal feature")]
    CaptureUnavailable,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("unknown voice range: {0}")]
    UnknownVoiceRange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VocalisError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VocalisError>;
