//! Strongest non-DC spectral bin.

use crate::dsp::spectrum::{argmax, bin_frequency, refine_peak, SpectrumAnalyzer};

/// Frequency of the largest magnitude bin in Hz, or 0.0 for a silent frame.
pub fn estimate(analyzer: &mut SpectrumAnalyzer, samples: &[f32], sample_rate: u32) -> f32 {
    let magnitudes = analyzer.magnitudes(samples);
    match argmax(&magnitudes, 1, magnitudes.len()) {
        Some(bin) if magnitudes[bin] > 0.0 => {
            bin_frequency(refine_peak(&magnitudes, bin), sample_rate, samples.len())
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn finds_bin_centred_tone_exactly() {
        // 1000 Hz at 8 kHz over 1024 samples is bin 128.
        let samples: Vec<f32> = (0..1024)
            .map(|i| (2.0 * PI * 1_000.0 * i as f32 / 8_000.0).sin())
            .collect();
        let mut analyzer = SpectrumAnalyzer::new();
        let f = estimate(&mut analyzer, &samples, 8_000);
        assert!((f - 1_000.0).abs() < 0.5, "got {f}");
    }

    #[test]
    fn silent_frame_has_no_estimate() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(estimate(&mut analyzer, &vec![0.0; 256], 8_000), 0.0);
    }
}
