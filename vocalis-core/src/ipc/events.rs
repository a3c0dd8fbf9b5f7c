//! Event types published to the presentation layer.
//!
//! ## Channels
//!
//! | Event | Subscribe with |
//! |-------|----------------|
//! | `PitchEvent` | `PitchEngine::subscribe_results` |
//! | `VoiceRangeEvent` | `PitchEngine::subscribe_voice_range` |
//! | `AudioActivityEvent` | `PitchEngine::subscribe_activity` |
//! | `EngineStatusEvent` | `PitchEngine::subscribe_status` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pitch::note::NoteLabel;
use crate::range::VoiceRangeProfile;
use crate::tuning::TuningGuide;

// ---------------------------------------------------------------------------
// Pitch results
// ---------------------------------------------------------------------------

/// One display-worthy pitch reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Smoothed fundamental frequency (Hz), always > 0.
    pub frequency: f32,
    /// Note, octave and cents derived from `frequency`.
    pub note: NoteLabel,
    /// Confidence score in [0, 100].
    pub confidence: f32,
    /// RMS level of the raw frame.
    pub rms: f32,
    /// Nearest target in the configured tuning scale.
    pub tuning: Option<TuningGuide>,
    /// Name of the voice-range profile active when this was produced.
    pub voice_range: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted for every accepted, stable reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub result: AnalysisResult,
}

// ---------------------------------------------------------------------------
// Voice range events
// ---------------------------------------------------------------------------

/// Emitted whenever the active voice-range profile changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRangeEvent {
    pub profile: VoiceRangeProfile,
    /// `false` for manual overrides.
    pub auto_detected: bool,
}

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Emitted for each analyzed frame, voiced or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the frame.
    pub rms: f32,
    /// Voice/noise classifier decision for the frame.
    pub voice_detected: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the pitch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Capturing and analyzing.
    Listening,
    /// Capture stopped; the engine may be restarted.
    Stopped,
    /// Capture failed; recording has been forced off.
    Error,
}
