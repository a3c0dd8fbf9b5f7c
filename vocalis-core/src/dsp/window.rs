//! Window functions applied before spectral analysis.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Tapering window used to reduce spectral leakage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Rectangular,
}

impl WindowType {
    /// Symmetric window coefficients of length `len`.
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        if len <= 1 {
            return vec![1.0; len];
        }
        let denom = (len - 1) as f32;
        (0..len)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / denom;
                match self {
                    WindowType::Hann => 0.5 - 0.5 * x.cos(),
                    WindowType::Hamming => 0.54 - 0.46 * x.cos(),
                    WindowType::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
                    WindowType::Rectangular => 1.0,
                }
            })
            .collect()
    }

    /// Multiply `samples` by this window in place.
    pub fn apply(self, samples: &mut [f32]) {
        if self == WindowType::Rectangular {
            return;
        }
        let coeffs = self.coefficients(samples.len());
        for (s, w) in samples.iter_mut().zip(coeffs) {
            *s *= w;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hann_tapers_to_zero_and_peaks_in_the_middle() {
        let w = WindowType::Hann.coefficients(9);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w[8], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w[4], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn hamming_keeps_a_pedestal() {
        let w = WindowType::Hamming.coefficients(16);
        assert_abs_diff_eq!(w[0], 0.08, epsilon = 1e-5);
    }

    #[test]
    fn rectangular_is_identity() {
        let mut samples = vec![0.25f32; 32];
        WindowType::Rectangular.apply(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn degenerate_lengths_do_not_divide_by_zero() {
        assert!(WindowType::Blackman.coefficients(0).is_empty());
        assert_eq!(WindowType::Blackman.coefficients(1), vec![1.0]);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&WindowType::Blackman).expect("serialize window");
        assert_eq!(json, "\"blackman\"");
    }
}
