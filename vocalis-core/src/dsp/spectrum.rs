//! FFT plumbing shared by the classifier, preprocessor and estimators.
//!
//! `SpectrumAnalyzer` caches one plan per (length, direction), so plans for a
//! given length are built once per worker and reused for every frame. Plans
//! are `Arc<dyn Fft>` and therefore `Send`, unlike `FftPlanner` itself.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftDirection, FftPlanner};

pub use rustfft::num_complex::Complex32;

/// Forward/inverse FFT helper with cached plans.
pub struct SpectrumAnalyzer {
    /// Keyed by (length, inverse).
    plans: HashMap<(usize, bool), Arc<dyn Fft<f32>>>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
        }
    }

    fn plan(&mut self, len: usize, direction: FftDirection) -> Arc<dyn Fft<f32>> {
        Arc::clone(
            self.plans
                .entry((len, direction == FftDirection::Inverse))
                .or_insert_with(|| FftPlanner::new().plan_fft(len, direction)),
        )
    }

    /// Full complex spectrum of a real signal (length == `samples.len()`).
    pub fn forward(&mut self, samples: &[f32]) -> Vec<Complex32> {
        let mut buffer: Vec<Complex32> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        if buffer.is_empty() {
            return buffer;
        }
        self.plan(buffer.len(), FftDirection::Forward)
            .process(&mut buffer);
        buffer
    }

    /// Real part of the inverse transform, normalised by the length.
    pub fn inverse_real(&mut self, mut spectrum: Vec<Complex32>) -> Vec<f32> {
        let len = spectrum.len();
        if len == 0 {
            return Vec::new();
        }
        self.plan(len, FftDirection::Inverse).process(&mut spectrum);
        let scale = 1.0 / len as f32;
        spectrum.into_iter().map(|c| c.re * scale).collect()
    }

    /// Magnitudes of the non-negative frequency bins `0..=N/2`.
    pub fn magnitudes(&mut self, samples: &[f32]) -> Vec<f32> {
        let half = samples.len() / 2;
        self.forward(samples)
            .into_iter()
            .take(half + 1)
            .map(|c| c.norm())
            .collect()
    }

    /// Linear (non-circular) autocorrelation for lags `0..N`.
    ///
    /// Computed as the inverse transform of the power spectrum of the signal
    /// zero-padded to twice its length, which equals the direct sum
    /// `r[k] = Σ x[n]·x[n+k]`.
    pub fn autocorrelation(&mut self, samples: &[f32]) -> Vec<f32> {
        let len = samples.len();
        if len == 0 {
            return Vec::new();
        }
        let mut padded = Vec::with_capacity(len * 2);
        padded.extend_from_slice(samples);
        padded.resize(len * 2, 0.0);

        let power: Vec<Complex32> = self
            .forward(&padded)
            .into_iter()
            .map(|c| Complex::new(c.norm_sqr(), 0.0))
            .collect();
        let mut r = self.inverse_real(power);
        r.truncate(len);
        r
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Centre frequency of FFT bin `bin` (may be fractional) for a frame of `len` samples.
pub fn bin_frequency(bin: f32, sample_rate: u32, len: usize) -> f32 {
    if len == 0 {
        return 0.0;
    }
    bin * sample_rate as f32 / len as f32
}

/// Closest FFT bin to `frequency` for a frame of `len` samples.
pub fn frequency_bin(frequency: f32, sample_rate: u32, len: usize) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    (frequency * len as f32 / sample_rate as f32).round().max(0.0) as usize
}

/// Sub-bin offset of a peak from a three-point parabolic fit, in `[-0.5, 0.5]`.
pub fn parabolic_offset(prev: f32, center: f32, next: f32) -> f32 {
    let denom = prev - 2.0 * center + next;
    if denom.abs() <= f32::EPSILON {
        return 0.0;
    }
    (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
}

/// Index of the largest value in `values[from..to]`, or `None` when the range is empty.
pub fn argmax(values: &[f32], from: usize, to: usize) -> Option<usize> {
    let to = to.min(values.len());
    if from >= to {
        return None;
    }
    let mut best = from;
    for i in from + 1..to {
        if values[i] > values[best] {
            best = i;
        }
    }
    Some(best)
}

/// Refine an integer peak index with its neighbours, when both exist.
pub fn refine_peak(values: &[f32], idx: usize) -> f32 {
    if idx == 0 || idx + 1 >= values.len() {
        return idx as f32;
    }
    idx as f32 + parabolic_offset(values[idx - 1], values[idx], values[idx + 1])
}
