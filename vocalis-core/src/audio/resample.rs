//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Devices that cannot open at the analysis rate are captured at their
//! default rate; `RateConverter` brings those frames to the analysis rate on
//! the worker thread, where allocation is allowed. Matching rates use a
//! passthrough with no rubato session at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{Result, VocalisError};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `VocalisError::AudioDevice` if either rate is zero or rubato fails to
    /// initialise.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == 0 || target_rate == 0 || chunk_size == 0 {
            return Err(VocalisError::AudioDevice(format!(
                "resampler init: invalid rates {capture_rate} -> {target_rate} (chunk {chunk_size})"
            )));
        }
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VocalisError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        info!(capture_rate, target_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Convert `samples`, returning whatever output is ready (may be empty).
    ///
    /// Input is consumed in `chunk_size` blocks; any remainder waits for the
    /// next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// `true` when no conversion happens.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(44_100, 44_100, 1_024).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn ratio_48k_to_44k1_has_expected_length() {
        let mut rc = RateConverter::new(48_000, 44_100, 1_024).unwrap();
        assert!(!rc.is_passthrough());
        let out = rc.process(&vec![0.0f32; 4_096]);
        let expected = (4_096.0 * 44_100.0 / 48_000.0) as isize;
        assert!(
            (out.len() as isize - expected).unsigned_abs() <= 16,
            "output len={} expected≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn partial_blocks_accumulate() {
        let mut rc = RateConverter::new(16_000, 8_000, 1_024).unwrap();
        assert!(rc.process(&vec![0.0f32; 600]).is_empty());
        assert!(!rc.process(&vec![0.0f32; 600]).is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 8_000, 1_024),
            Err(VocalisError::AudioDevice(_))
        ));
    }
}
