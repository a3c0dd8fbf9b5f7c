//! Windowing + spectral high-pass ahead of pitch estimation.

use rustfft::num_complex::Complex;

use super::spectrum::{bin_frequency, SpectrumAnalyzer};
use super::window::WindowType;

/// Applies the analysis window, then zeroes every spectral bin below the
/// cutoff (both the positive and mirrored negative frequencies) and
/// transforms back to the time domain. Output length equals input length.
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    window: WindowType,
    cutoff_hz: f32,
    sample_rate: u32,
}

impl Preprocessor {
    pub fn new(window: WindowType, cutoff_hz: f32, sample_rate: u32) -> Self {
        Self {
            window,
            cutoff_hz,
            sample_rate,
        }
    }

    pub fn process(&self, analyzer: &mut SpectrumAnalyzer, samples: &[f32]) -> Vec<f32> {
        let len = samples.len();
        if len == 0 {
            return Vec::new();
        }

        let mut windowed = samples.to_vec();
        self.window.apply(&mut windowed);

        if self.cutoff_hz <= 0.0 {
            return windowed;
        }

        let mut spectrum = analyzer.forward(&windowed);
        for (k, bin) in spectrum.iter_mut().enumerate() {
            let mirrored = k.min(len - k);
            if bin_frequency(mirrored as f32, self.sample_rate, len) < self.cutoff_hz {
                *bin = Complex::new(0.0, 0.0);
            }
        }
        analyzer.inverse_real(spectrum)
    }
}
