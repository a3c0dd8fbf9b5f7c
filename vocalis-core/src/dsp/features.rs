//! Frame-level signal features used to tell voice from noise.

use super::spectrum::{bin_frequency, SpectrumAnalyzer};
use super::window::WindowType;

/// Root-mean-square of a sample slice; 0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Fraction of adjacent sample pairs whose signs differ.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// Amplitude-weighted mean frequency of `magnitudes` (bins `0..=N/2`), DC excluded.
pub fn spectral_centroid(magnitudes: &[f32], sample_rate: u32, frame_len: usize) -> f32 {
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (bin, &mag) in magnitudes.iter().enumerate().skip(1) {
        weighted += bin_frequency(bin as f32, sample_rate, frame_len) as f64 * mag as f64;
        total += mag as f64;
    }
    if total <= 0.0 {
        return 0.0;
    }
    (weighted / total) as f32
}

/// Frequency below which `fraction` of the spectral energy lies, DC excluded.
pub fn spectral_rolloff(
    magnitudes: &[f32],
    sample_rate: u32,
    frame_len: usize,
    fraction: f32,
) -> f32 {
    let total: f64 = magnitudes
        .iter()
        .skip(1)
        .map(|&m| (m as f64) * (m as f64))
        .sum();
    if total <= 0.0 {
        return 0.0;
    }
    let target = total * fraction.clamp(0.0, 1.0) as f64;
    let mut cumulative = 0.0f64;
    for (bin, &mag) in magnitudes.iter().enumerate().skip(1) {
        cumulative += (mag as f64) * (mag as f64);
        if cumulative >= target {
            return bin_frequency(bin as f32, sample_rate, frame_len);
        }
    }
    bin_frequency(magnitudes.len().saturating_sub(1) as f32, sample_rate, frame_len)
}

/// Everything the voice/noise classifier looks at for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralFeatures {
    pub rms: f32,
    pub centroid_hz: f32,
    pub rolloff_hz: f32,
    pub zero_crossing_rate: f32,
}

impl SpectralFeatures {
    /// Compute features from a Hann-windowed magnitude spectrum of `samples`.
    pub fn compute(
        analyzer: &mut SpectrumAnalyzer,
        samples: &[f32],
        sample_rate: u32,
        rolloff_fraction: f32,
    ) -> Self {
        let mut windowed = samples.to_vec();
        WindowType::Hann.apply(&mut windowed);
        let magnitudes = analyzer.magnitudes(&windowed);
        Self {
            rms: rms(samples),
            centroid_hz: spectral_centroid(&magnitudes, sample_rate, samples.len()),
            rolloff_hz: spectral_rolloff(&magnitudes, sample_rate, samples.len(), rolloff_fraction),
            zero_crossing_rate: zero_crossing_rate(samples),
        }
    }
}
