//! Confidence score in `[0, 100]` from amplitude and harmonic structure.
//!
//! Half the score comes from loudness relative to the voice threshold, half
//! from how much energy sits at the 2nd, 3rd and 4th harmonics of the
//! accepted fundamental. Magnitudes are measured on a Hann-windowed spectrum
//! scaled so a full-scale sine reads 1.0 at its bin.

use crate::dsp::features::rms;
use crate::dsp::spectrum::{frequency_bin, SpectrumAnalyzer};
use crate::dsp::window::WindowType;

const COMPONENT_MAX: f32 = 50.0;
const HARMONICS: [u32; 3] = [2, 3, 4];

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    voice_threshold: f32,
    harmonic_weight: f32,
}

impl ConfidenceScorer {
    pub fn new(voice_threshold: f32, harmonic_weight: f32) -> Self {
        Self {
            voice_threshold,
            harmonic_weight,
        }
    }

    pub fn amplitude_component(&self, frame_rms: f32) -> f32 {
        if frame_rms <= 0.0 {
            return 0.0;
        }
        if self.voice_threshold <= 0.0 {
            return COMPONENT_MAX;
        }
        (frame_rms / self.voice_threshold).min(1.0) * COMPONENT_MAX
    }

    /// Mean normalised magnitude at the in-band harmonics, weighted and clamped.
    pub fn harmonic_component(
        &self,
        analyzer: &mut SpectrumAnalyzer,
        samples: &[f32],
        sample_rate: u32,
        frequency: f32,
    ) -> f32 {
        if samples.len() < 2 || frequency <= 0.0 {
            return 0.0;
        }
        let window = WindowType::Hann.coefficients(samples.len());
        let gain: f32 = window.iter().sum();
        if gain <= 0.0 {
            return 0.0;
        }
        let windowed: Vec<f32> = samples.iter().zip(&window).map(|(s, w)| s * w).collect();
        let magnitudes = analyzer.magnitudes(&windowed);
        let scale = 2.0 / gain;

        let nyquist = sample_rate as f32 / 2.0;
        let mut total = 0.0f32;
        let mut checked = 0u32;
        for h in HARMONICS {
            let harmonic = frequency * h as f32;
            if harmonic > nyquist {
                continue;
            }
            let bin = frequency_bin(harmonic, sample_rate, samples.len());
            if let Some(&mag) = magnitudes.get(bin) {
                total += mag * scale;
                checked += 1;
            }
        }
        if checked == 0 {
            return 0.0;
        }
        (total / checked as f32 * self.harmonic_weight).clamp(0.0, COMPONENT_MAX)
    }

    /// Score for `samples` (the raw frame) at the accepted `frequency`.
    pub fn score(
        &self,
        analyzer: &mut SpectrumAnalyzer,
        samples: &[f32],
        sample_rate: u32,
        frequency: f32,
    ) -> f32 {
        let frame_rms = rms(samples);
        if frame_rms <= 0.0 {
            return 0.0;
        }
        let total = self.amplitude_component(frame_rms)
            + self.harmonic_component(analyzer, samples, sample_rate, frequency);
        total.clamp(0.0, 100.0)
    }
}
