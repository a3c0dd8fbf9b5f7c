//! Pitch estimation, smoothing, confidence and note naming.

pub mod autocorr;
pub mod confidence;
pub mod estimator;
pub mod hps;
pub mod note;
pub mod smoothing;
pub mod spectral_peak;

pub use confidence::ConfidenceScorer;
pub use estimator::{median, EstimationMethod, FrequencyEstimator, FusedEstimate};
pub use note::{cents_between, NoteLabel, PitchClass};
pub use smoothing::{GateReading, StabilityGate};
