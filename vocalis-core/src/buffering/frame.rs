//! Fixed-size mono audio frame handed from capture to the analysis worker.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Built on the capture thread and moved through the queue; the worker owns
/// it exclusively and drops it after analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Mono f32 samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate the samples were captured at (Hz).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this frame in seconds (0 for a zero sample rate).
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Every sample is a finite number.
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }
}
