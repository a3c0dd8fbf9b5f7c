//! Analysis configuration.
//!
//! `AnalysisConfig` is read once when the engine is constructed and is
//! immutable for the rest of the session, except for the reference frequency
//! and the voice range, which the worker accepts as runtime commands.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsp::window::WindowType;
use crate::error::{Result, VocalisError};
use crate::pitch::note::PitchClass;
use crate::tuning::TuningMode;

/// Supported capture/analysis sample rates (Hz).
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=192_000;
/// Supported frame sizes (samples).
pub const FRAME_SIZE_RANGE: std::ops::RangeInclusive<usize> = 64..=8_192;
/// Sane band for the A4 reference frequency (Hz).
pub const REFERENCE_RANGE: std::ops::RangeInclusive<f32> = 400.0..=480.0;

/// Spectral bands a frame must fall in to be treated as voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ClassifierConfig {
    /// Lower bound for the spectral centroid (Hz). Default: 100.
    pub centroid_min_hz: f32,
    /// Upper bound for the spectral centroid (Hz). Default: 3000.
    pub centroid_max_hz: f32,
    /// Fraction of spectral energy that defines the rolloff point. Default: 0.9.
    pub rolloff_fraction: f32,
    /// Maximum rolloff frequency (Hz). Default: 4000.
    pub rolloff_max_hz: f32,
    /// Minimum zero-crossing rate. Default: 0.01.
    pub zcr_min: f32,
    /// Maximum zero-crossing rate. Default: 0.3.
    pub zcr_max: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            centroid_min_hz: 100.0,
            centroid_max_hz: 3_000.0,
            rolloff_fraction: 0.9,
            rolloff_max_hz: 4_000.0,
            zcr_min: 0.01,
            zcr_max: 0.3,
        }
    }
}

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analysis sample rate (Hz). Capture at other rates is resampled. Default: 44100.
    pub sample_rate: u32,
    /// Requested capture channel count. Frames are mixed to mono. Default: 1.
    pub channels: u16,
    /// Samples per analysis frame. Default: 4096.
    pub frame_size: usize,
    /// Lowest frequency accepted as a voice fundamental (Hz). Default: 80.
    pub min_voice_freq: f32,
    /// Highest frequency accepted as a voice fundamental (Hz). Default: 2000.
    pub max_voice_freq: f32,
    /// A4 reference frequency (Hz). Default: 440.
    pub reference_frequency: f32,
    /// RMS a frame must exceed to be considered voice. Default: 0.01.
    pub voice_threshold: f32,
    /// Sub-window RMS below which the noise gate attenuates. Default: 0.005.
    pub noise_gate_threshold: f32,
    /// Exponential smoothing factor in [0, 1). Default: 0.7.
    pub smoothing_factor: f32,
    /// Maximum drift between consecutive smoothed readings (cents). Default: 15.
    pub stability_tolerance_cents: f32,
    /// Consecutive stable readings before a pitch is display-worthy. Default: 3.
    pub required_stable_readings: u32,
    /// Learn the singer's range from history. Default: true.
    pub auto_range_detection: bool,
    /// History entries required before the range is re-evaluated. Default: 20.
    pub range_min_samples: usize,
    /// Minimum time between range re-evaluations (ms). Default: 2000.
    pub range_min_interval_ms: u64,
    /// Pitch history ring buffer capacity. Default: 100.
    pub history_capacity: usize,
    /// Scale applied to the mean harmonic magnitude in the confidence score. Default: 200.
    pub harmonic_weight: f32,
    /// Minimum profile score before falling back to "Full Range". Default: 0.6.
    pub range_confidence_threshold: f32,
    /// Spectral high-pass cutoff applied before estimation (Hz). Default: 60.
    pub highpass_cutoff_hz: f32,
    /// Window applied before estimation. Default: Hann.
    pub window: WindowType,
    /// Deviation (cents) still reported as in tune. Default: 10.
    pub tuning_tolerance_cents: f32,
    /// Scale used to pick tuning targets. Default: chromatic.
    pub tuning_mode: TuningMode,
    /// Key the tuning scale is built on. Default: C.
    pub tuning_key: PitchClass,
    /// Voiceless frames after which smoothing state is dropped. Default: 8.
    pub reset_after_silent_frames: u32,
    /// Voice/noise classifier bands.
    pub classifier: ClassifierConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            frame_size: 4_096,
            min_voice_freq: 80.0,
            max_voice_freq: 2_000.0,
            reference_frequency: 440.0,
            voice_threshold: 0.01,
            noise_gate_threshold: 0.005,
            smoothing_factor: 0.7,
            stability_tolerance_cents: 15.0,
            required_stable_readings: 3,
            auto_range_detection: true,
            range_min_samples: 20,
            range_min_interval_ms: 2_000,
            history_capacity: 100,
            harmonic_weight: 200.0,
            range_confidence_threshold: 0.6,
            highpass_cutoff_hz: 60.0,
            window: WindowType::Hann,
            tuning_tolerance_cents: 10.0,
            tuning_mode: TuningMode::Chromatic,
            tuning_key: PitchClass::C,
            reset_after_silent_frames: 8,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Time between voice-range re-evaluations.
    pub fn range_min_interval(&self) -> Duration {
        Duration::from_millis(self.range_min_interval_ms)
    }

    /// Check every field; the first violation is returned.
    ///
    /// # Errors
    /// Returns `VocalisError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(VocalisError::config(
                "sampleRate",
                format!("must be within 8000..=192000 Hz, got {}", self.sample_rate),
            ));
        }
        if self.channels == 0 {
            return Err(VocalisError::config("channels", "must be positive"));
        }
        if !FRAME_SIZE_RANGE.contains(&self.frame_size) {
            return Err(VocalisError::config(
                "frameSize",
                format!("must be within 64..=8192 samples, got {}", self.frame_size),
            ));
        }
        if !(self.min_voice_freq > 0.0 && self.min_voice_freq < self.max_voice_freq) {
            return Err(VocalisError::config(
                "minVoiceFreq",
                format!(
                    "must satisfy 0 < min < max, got {}..{}",
                    self.min_voice_freq, self.max_voice_freq
                ),
            ));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if self.max_voice_freq > nyquist {
            return Err(VocalisError::config(
                "maxVoiceFreq",
                format!("must not exceed the Nyquist frequency {nyquist} Hz"),
            ));
        }
        if !REFERENCE_RANGE.contains(&self.reference_frequency) {
            return Err(VocalisError::config(
                "referenceFrequency",
                format!(
                    "must be within 400..=480 Hz, got {}",
                    self.reference_frequency
                ),
            ));
        }
        non_negative("voiceThreshold", self.voice_threshold)?;
        non_negative("noiseGateThreshold", self.noise_gate_threshold)?;
        if !(0.0..1.0).contains(&self.smoothing_factor) {
            return Err(VocalisError::config(
                "smoothingFactor",
                format!("must be within [0, 1), got {}", self.smoothing_factor),
            ));
        }
        non_negative("stabilityToleranceCents", self.stability_tolerance_cents)?;
        if self.required_stable_readings == 0 {
            return Err(VocalisError::config(
                "requiredStableReadings",
                "must be at least 1",
            ));
        }
        if self.history_capacity == 0 {
            return Err(VocalisError::config("historyCapacity", "must be at least 1"));
        }
        if self.range_min_samples == 0 || self.range_min_samples > self.history_capacity {
            return Err(VocalisError::config(
                "rangeMinSamples",
                format!(
                    "must be within 1..={} (history capacity), got {}",
                    self.history_capacity, self.range_min_samples
                ),
            ));
        }
        if !(self.harmonic_weight > 0.0) {
            return Err(VocalisError::config("harmonicWeight", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.range_confidence_threshold) {
            return Err(VocalisError::config(
                "rangeConfidenceThreshold",
                "must be within [0, 1]",
            ));
        }
        non_negative("highpassCutoffHz", self.highpass_cutoff_hz)?;
        non_negative("tuningToleranceCents", self.tuning_tolerance_cents)?;

        let c = &self.classifier;
        if !(c.centroid_min_hz < c.centroid_max_hz) {
            return Err(VocalisError::config(
                "classifier.centroid",
                "min must be below max",
            ));
        }
        if !(c.rolloff_fraction > 0.0 && c.rolloff_fraction <= 1.0) {
            return Err(VocalisError::config(
                "classifier.rolloffFraction",
                "must be within (0, 1]",
            ));
        }
        non_negative("classifier.rolloffMaxHz", c.rolloff_max_hz)?;
        if !(c.zcr_min >= 0.0 && c.zcr_min <= c.zcr_max) {
            return Err(VocalisError::config(
                "classifier.zeroCrossingRate",
                "must satisfy 0 <= min <= max",
            ));
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(VocalisError::config(
            field,
            format!("must be non-negative, got {value}"),
        ))
    }
}
