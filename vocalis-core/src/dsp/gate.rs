//! Noise gate over overlapping sub-windows.
//!
//! The frame is split into `GATE_WINDOW`-sample sub-windows with 50 % overlap.
//! Any sub-window whose RMS is below the threshold has its samples scaled by
//! `GATE_ATTENUATION`. Attenuation is not cumulative: a sample covered by two
//! quiet sub-windows is scaled once.

use super::features::rms;

/// Sub-window length in samples.
pub const GATE_WINDOW: usize = 256;
/// Hop between sub-windows (50 % overlap).
pub const GATE_HOP: usize = GATE_WINDOW / 2;
/// Gain applied to quiet sub-windows. Non-zero so gated regions do not click.
pub const GATE_ATTENUATION: f32 = 0.1;

/// Deterministic RMS noise gate.
#[derive(Debug, Clone, Copy)]
pub struct NoiseGate {
    threshold: f32,
}

impl NoiseGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Return a gated copy of `samples`.
    pub fn apply(&self, samples: &[f32]) -> Vec<f32> {
        let len = samples.len();
        let mut out = samples.to_vec();
        if len == 0 {
            return out;
        }

        let mut gain = vec![1.0f32; len];
        for start in window_starts(len) {
            let end = (start + GATE_WINDOW).min(len);
            if rms(&samples[start..end]) < self.threshold {
                gain[start..end].fill(GATE_ATTENUATION);
            }
        }

        for (s, g) in out.iter_mut().zip(gain) {
            *s *= g;
        }
        out
    }
}

/// Sub-window start offsets; the last window is aligned to the frame end so
/// trailing samples are always covered.
fn window_starts(len: usize) -> Vec<usize> {
    if len <= GATE_WINDOW {
        return vec![0];
    }
    let mut starts: Vec<usize> = (0..=len - GATE_WINDOW).step_by(GATE_HOP).collect();
    let last = len - GATE_WINDOW;
    if starts.last() != Some(&last) {
        starts.push(last);
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn loud_frame_passes_unchanged() {
        let samples: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 0.4 } else { -0.4 }).collect();
        let gated = NoiseGate::new(0.005).apply(&samples);
        assert_eq!(gated, samples);
    }

    #[test]
    fn quiet_region_is_attenuated_not_zeroed() {
        let mut samples = vec![0.001f32; 1024];
        for s in samples.iter_mut().take(512) {
            *s = 0.5;
        }
        let gated = NoiseGate::new(0.005).apply(&samples);
        assert_abs_diff_eq!(gated[0], 0.5);
        assert_abs_diff_eq!(gated[1023], 0.001 * GATE_ATTENUATION, epsilon = 1e-9);
        assert!(gated[1023] != 0.0);
    }

    #[test]
    fn attenuation_is_applied_once_under_overlap() {
        let samples = vec![0.001f32; 1024];
        let gated = NoiseGate::new(0.005).apply(&samples);
        for s in gated {
            assert_abs_diff_eq!(s, 0.001 * GATE_ATTENUATION, epsilon = 1e-9);
        }
    }

    #[test]
    fn window_starts_cover_tail() {
        assert_eq!(window_starts(100), vec![0]);
        let starts = window_starts(1000);
        assert_eq!(starts.first(), Some(&0));
        assert_eq!(starts.last(), Some(&(1000 - GATE_WINDOW)));
        assert!(starts.windows(2).all(|w| w[1] - w[0] <= GATE_HOP));
    }

    #[test]
    fn empty_frame_stays_empty() {
        assert!(NoiseGate::new(0.01).apply(&[]).is_empty());
    }
}
