//! Multi-method fundamental-frequency estimation.
//!
//! Each [`EstimationMethod`] runs independently on the preprocessed frame.
//! Results inside the configured voice band are kept and the fused estimate is
//! their median, so one method landing on the wrong octave is outvoted
//! without having to know which one it was.

use serde::{Deserialize, Serialize};

use super::{autocorr, hps, spectral_peak};
use crate::dsp::spectrum::SpectrumAnalyzer;

/// The independent pitch-estimation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimationMethod {
    HarmonicProductSpectrum,
    Autocorrelation,
    SpectralPeak,
}

impl EstimationMethod {
    pub const ALL: [EstimationMethod; 3] = [
        EstimationMethod::HarmonicProductSpectrum,
        EstimationMethod::Autocorrelation,
        EstimationMethod::SpectralPeak,
    ];

    /// Raw estimate in Hz (0.0 when the method finds nothing).
    pub fn estimate(self, analyzer: &mut SpectrumAnalyzer, samples: &[f32], sample_rate: u32) -> f32 {
        match self {
            EstimationMethod::HarmonicProductSpectrum => hps::estimate(analyzer, samples, sample_rate),
            EstimationMethod::Autocorrelation => autocorr::estimate(analyzer, samples, sample_rate),
            EstimationMethod::SpectralPeak => spectral_peak::estimate(analyzer, samples, sample_rate),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EstimationMethod::HarmonicProductSpectrum => "hps",
            EstimationMethod::Autocorrelation => "autocorr",
            EstimationMethod::SpectralPeak => "fft",
        }
    }
}

/// Fused estimate plus the in-band per-method results it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEstimate {
    /// Median of `candidates`, or 0.0 when none were in band.
    pub frequency: f32,
    pub candidates: Vec<(EstimationMethod, f32)>,
}

impl FusedEstimate {
    pub fn is_pitched(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Runs every method and fuses the in-band results.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyEstimator {
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
}

impl FrequencyEstimator {
    pub fn new(sample_rate: u32, min_freq: f32, max_freq: f32) -> Self {
        Self {
            sample_rate,
            min_freq,
            max_freq,
        }
    }

    pub fn band(&self) -> (f32, f32) {
        (self.min_freq, self.max_freq)
    }

    pub fn in_band(&self, frequency: f32) -> bool {
        frequency.is_finite() && frequency >= self.min_freq && frequency <= self.max_freq
    }

    pub fn estimate(&self, analyzer: &mut SpectrumAnalyzer, samples: &[f32]) -> FusedEstimate {
        if samples.is_empty() {
            return FusedEstimate {
                frequency: 0.0,
                candidates: Vec::new(),
            };
        }
        let candidates: Vec<(EstimationMethod, f32)> = EstimationMethod::ALL
            .iter()
            .map(|&m| (m, m.estimate(analyzer, samples, self.sample_rate)))
            .filter(|&(_, f)| f > 0.0 && self.in_band(f))
            .collect();
        let values: Vec<f32> = candidates.iter().map(|&(_, f)| f).collect();
        FusedEstimate {
            frequency: median(&values).unwrap_or(0.0),
            candidates,
        }
    }
}

/// Median of `values`; the mean of the middle pair for even counts.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Preprocessor, WindowType};
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 8_000;
    const FRAME: usize = 8_192;

    fn preprocessed_sine(freq: f32) -> Vec<f32> {
        let raw: Vec<f32> = (0..FRAME)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        let mut analyzer = SpectrumAnalyzer::new();
        Preprocessor::new(WindowType::Hann, 60.0, SAMPLE_RATE).process(&mut analyzer, &raw)
    }

    fn within_one_percent(actual: f32, expected: f32) -> bool {
        (actual - expected).abs() / expected <= 0.01
    }

    #[test]
    fn every_method_tracks_pure_sines() {
        let mut analyzer = SpectrumAnalyzer::new();
        for freq in [110.0f32, 220.0, 440.0] {
            let frame = preprocessed_sine(freq);
            for method in EstimationMethod::ALL {
                let f = method.estimate(&mut analyzer, &frame, SAMPLE_RATE);
                assert!(
                    within_one_percent(f, freq),
                    "{} estimated {f} for {freq}",
                    method.label()
                );
            }
        }
    }

    #[test]
    fn fused_estimate_is_the_median_of_the_methods() {
        let mut analyzer = SpectrumAnalyzer::new();
        let estimator = FrequencyEstimator::new(SAMPLE_RATE, 80.0, 2_000.0);
        for freq in [110.0f32, 220.0, 440.0] {
            let fused = estimator.estimate(&mut analyzer, &preprocessed_sine(freq));
            assert_eq!(fused.candidates.len(), 3);
            let values: Vec<f32> = fused.candidates.iter().map(|&(_, f)| f).collect();
            assert_eq!(Some(fused.frequency), median(&values));
            assert!(within_one_percent(fused.frequency, freq), "fused {}", fused.frequency);
        }
    }

    #[test]
    fn out_of_band_results_are_dropped() {
        let mut analyzer = SpectrumAnalyzer::new();
        let estimator = FrequencyEstimator::new(SAMPLE_RATE, 300.0, 2_000.0);
        let fused = estimator.estimate(&mut analyzer, &preprocessed_sine(110.0));
        assert!(fused.candidates.is_empty());
        assert_eq!(fused.frequency, 0.0);
        assert!(!fused.is_pitched());
    }

    #[test]
    fn median_handles_odd_even_and_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
