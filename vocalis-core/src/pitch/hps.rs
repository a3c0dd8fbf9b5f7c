//! Harmonic Product Spectrum.
//!
//! The magnitude spectrum is multiplied by copies of itself decimated by 2..=5,
//! so bins whose harmonics are also strong are reinforced. A weak or missing
//! fundamental still wins when its harmonics carry the energy. Magnitudes are
//! normalised to the spectral peak to keep the product in range.
//!
//! A spectrum holding a single partial gives every sub-multiple of it the same
//! noise-level product. When the winning bin has fewer than two partials among
//! its harmonics, the partial itself is reported.

use crate::dsp::spectrum::{argmax, bin_frequency, refine_peak, SpectrumAnalyzer};

/// Highest harmonic folded into the product.
pub const HPS_HARMONICS: usize = 5;
/// Partials below this fraction of the spectral peak are noise (-60 dB).
const SUPPORT_RATIO: f32 = 1e-3;

/// Fundamental estimate in Hz, or 0.0 when the spectrum is empty or silent.
pub fn estimate(analyzer: &mut SpectrumAnalyzer, samples: &[f32], sample_rate: u32) -> f32 {
    let magnitudes = analyzer.magnitudes(samples);
    let peak = magnitudes.iter().skip(1).copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return 0.0;
    }

    // Every bin k searched must have k * HPS_HARMONICS inside the spectrum.
    let search_len = (magnitudes.len() - 1) / HPS_HARMONICS + 1;
    if search_len < 3 {
        return 0.0;
    }

    let normalized: Vec<f32> = magnitudes.iter().map(|&m| m / peak).collect();

    let mut product = normalized[..search_len].to_vec();
    for h in 2..=HPS_HARMONICS {
        for (k, acc) in product.iter_mut().enumerate() {
            *acc *= normalized[k * h];
        }
    }

    let bin = match argmax(&product, 1, product.len()) {
        Some(bin) if product[bin] > 0.0 => bin,
        _ => return 0.0,
    };

    let support = (1..=HPS_HARMONICS)
        .filter(|&h| normalized[bin * h] >= SUPPORT_RATIO)
        .count();
    if support < 2 {
        return match argmax(&magnitudes, 1, magnitudes.len()) {
            Some(peak_bin) => {
                bin_frequency(refine_peak(&magnitudes, peak_bin), sample_rate, samples.len())
            }
            None => 0.0,
        };
    }
    bin_frequency(refine_peak(&product, bin), sample_rate, samples.len())
}
