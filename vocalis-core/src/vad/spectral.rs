//! Stateless spectral voice/noise classifier.
//!
//! ## Checks, in order
//!
//! 1. RMS must exceed the voice threshold.
//! 2. Spectral centroid must lie within the centroid band.
//! 3. Spectral rolloff must not exceed the rolloff ceiling.
//! 4. Zero-crossing rate must lie within the ZCR band.
//!
//! The first failing check is reported.

use super::{RejectReason, VadDecision, VoiceActivityDetector};
use crate::buffering::AudioFrame;
use crate::config::ClassifierConfig;
use crate::dsp::{SpectralFeatures, SpectrumAnalyzer};

pub struct SpectralVoiceClassifier {
    voice_threshold: f32,
    bands: ClassifierConfig,
    analyzer: SpectrumAnalyzer,
}

impl SpectralVoiceClassifier {
    pub fn new(voice_threshold: f32, bands: ClassifierConfig) -> Self {
        Self {
            voice_threshold,
            bands,
            analyzer: SpectrumAnalyzer::new(),
        }
    }

    /// Apply the checks to precomputed features.
    pub fn judge(&self, features: &SpectralFeatures) -> VadDecision {
        let b = &self.bands;
        if features.rms <= 0.0 {
            return VadDecision::Reject(RejectReason::Empty);
        }
        if features.rms <= self.voice_threshold {
            return VadDecision::Reject(RejectReason::TooQuiet);
        }
        if features.centroid_hz < b.centroid_min_hz || features.centroid_hz > b.centroid_max_hz {
            return VadDecision::Reject(RejectReason::CentroidOutOfBand);
        }
        if features.rolloff_hz > b.rolloff_max_hz {
            return VadDecision::Reject(RejectReason::RolloffTooHigh);
        }
        if features.zero_crossing_rate < b.zcr_min || features.zero_crossing_rate > b.zcr_max {
            return VadDecision::Reject(RejectReason::ZeroCrossingOutOfBand);
        }
        VadDecision::Voice
    }

    /// Classify and also return the features for logging/events.
    pub fn analyze(&mut self, frame: &AudioFrame) -> (VadDecision, Option<SpectralFeatures>) {
        if frame.is_empty() {
            return (VadDecision::Reject(RejectReason::Empty), None);
        }
        let features = SpectralFeatures::compute(
            &mut self.analyzer,
            &frame.samples,
            frame.sample_rate,
            self.bands.rolloff_fraction,
        );
        (self.judge(&features), Some(features))
    }
}

impl VoiceActivityDetector for SpectralVoiceClassifier {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision {
        self.analyze(frame).0
    }

    fn reset(&mut self) {}
}
