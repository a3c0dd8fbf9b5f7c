//! Autocorrelation pitch estimate: the lag of the highest local maximum
//! (excluding zero lag) is taken as the period.

use crate::dsp::spectrum::{refine_peak, SpectrumAnalyzer};

/// Fundamental estimate in Hz, or 0.0 when no peak exists.
pub fn estimate(analyzer: &mut SpectrumAnalyzer, samples: &[f32], sample_rate: u32) -> f32 {
    let r = analyzer.autocorrelation(samples);
    if r.len() < 3 || r[0] <= 0.0 {
        return 0.0;
    }

    let mut best: Option<usize> = None;
    for lag in 1..r.len() - 1 {
        if r[lag] > r[lag - 1] && r[lag] > r[lag + 1] {
            match best {
                Some(b) if r[b] >= r[lag] => {}
                _ => best = Some(lag),
            }
        }
    }

    let Some(lag) = best else {
        return 0.0;
    };
    let period = refine_peak(&r, lag);
    if period <= 0.0 {
        return 0.0;
    }
    sample_rate as f32 / period
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_pulse_train_reports_its_period() {
        // Impulse every 40 samples at 8 kHz -> 200 Hz.
        let samples: Vec<f32> = (0..2_000).map(|i| if i % 40 == 0 { 1.0 } else { 0.0 }).collect();
        let mut analyzer = SpectrumAnalyzer::new();
        let f = estimate(&mut analyzer, &samples, 8_000);
        assert!((f - 200.0).abs() < 1.0, "got {f}");
    }

    #[test]
    fn degenerate_input_has_no_estimate() {
        let mut analyzer = SpectrumAnalyzer::new();
        assert_eq!(estimate(&mut analyzer, &[], 8_000), 0.0);
        assert_eq!(estimate(&mut analyzer, &[0.5, 0.5], 8_000), 0.0);
        assert_eq!(estimate(&mut analyzer, &vec![0.0; 512], 8_000), 0.0);
    }
}
