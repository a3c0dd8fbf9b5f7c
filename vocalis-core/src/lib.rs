//! # vocalis-core
//!
//! Real-time vocal pitch detection engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → unbounded frame queue → Pipeline(worker thread)
//!                                                          │
//!                                           voice/noise classifier, noise gate
//!                                                          │
//!                                     preprocess → HPS / autocorrelation / FFT peak
//!                                                          │
//!                                  median fusion → smoothing + stability → confidence
//!                                                          │
//!                                        broadcast::Sender<PitchEvent> (+ range events)
//! ```
//!
//! The audio callback never blocks. All spectral work happens on the worker.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod pitch;
pub mod range;
pub mod tuning;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::device::{list_input_devices, DeviceInfo};
pub use buffering::{AudioFrame, PitchHistory, PitchHistoryEntry};
pub use config::{AnalysisConfig, ClassifierConfig};
pub use engine::{DiagnosticsSnapshot, FrameAnalyzer, FrameOutcome, PitchEngine};
pub use error::{Result, VocalisError};
pub use ipc::events::{
    AnalysisResult, AudioActivityEvent, EngineStatus, EngineStatusEvent, PitchEvent,
    VoiceRangeEvent,
};
pub use pitch::{EstimationMethod, NoteLabel, PitchClass};
pub use range::VoiceRangeProfile;
pub use tuning::{TuningGuide, TuningMode, TuningStatus};
