//! Voice/noise classification.
//!
//! The `VoiceActivityDetector` trait is the seam between frame ingestion and
//! analysis: the pipeline only asks "is this frame worth estimating?" and
//! records why it was not.

pub mod spectral;

pub use spectral::SpectralVoiceClassifier;

use crate::buffering::AudioFrame;

/// Why a frame was not treated as voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Zero-length or all-zero frame.
    Empty,
    /// RMS at or below the voice threshold.
    TooQuiet,
    /// Spectral centroid outside the voice brightness band.
    CentroidOutOfBand,
    /// Too much energy at high frequencies.
    RolloffTooHigh,
    /// Tone/DC-like (too few crossings) or noise-like (too many).
    ZeroCrossingOutOfBand,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::TooQuiet => "too_quiet",
            RejectReason::CentroidOutOfBand => "centroid_out_of_band",
            RejectReason::RolloffTooHigh => "rolloff_too_high",
            RejectReason::ZeroCrossingOutOfBand => "zero_crossing_out_of_band",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Voice,
    Reject(RejectReason),
}

impl VadDecision {
    pub fn is_voice(self) -> bool {
        self == VadDecision::Voice
    }
}

/// Trait for all voice/noise classifiers.
///
/// Implementors may keep state between frames; the pipeline calls `reset`
/// when a session restarts.
pub trait VoiceActivityDetector: Send + 'static {
    /// Decide whether `frame` is candidate voice.
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision;

    fn reset(&mut self);
}
