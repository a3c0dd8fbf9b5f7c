//! Exponential smoothing + consecutive-reading stability gate.
//!
//! ## State
//!
//! - `previous`: last smoothed frequency (`None` until the first reading).
//! - `stable_count`: consecutive readings whose smoothed value moved no more
//!   than the tolerance, saturating at the required count.
//!
//! The first reading is adopted as-is and counts as stable (count = 1) so a
//! configuration requiring a single reading displays immediately.

use super::note::cents_between;

/// Outcome of feeding one raw estimate through the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateReading {
    pub smoothed: f32,
    /// Cents moved since the previous smoothed value (0 for the first reading).
    pub drift_cents: f32,
    pub stable_count: u32,
    /// `stable_count >= required`.
    pub display_worthy: bool,
}

#[derive(Debug, Clone)]
pub struct StabilityGate {
    smoothing_factor: f32,
    tolerance_cents: f32,
    required: u32,
    previous: Option<f32>,
    stable_count: u32,
}

impl StabilityGate {
    /// `smoothing_factor` is the weight of the previous value, in `[0, 1)`.
    pub fn new(smoothing_factor: f32, tolerance_cents: f32, required: u32) -> Self {
        Self {
            smoothing_factor: smoothing_factor.clamp(0.0, 0.999),
            tolerance_cents: tolerance_cents.max(0.0),
            required: required.max(1),
            previous: None,
            stable_count: 0,
        }
    }

    /// Feed one in-band raw estimate (Hz, > 0).
    pub fn update(&mut self, raw: f32) -> GateReading {
        let (smoothed, drift_cents) = match self.previous {
            None => {
                self.stable_count = 1;
                (raw, 0.0)
            }
            Some(prev) => {
                let a = self.smoothing_factor;
                let smoothed = a * prev + (1.0 - a) * raw;
                let drift = cents_between(prev, smoothed);
                if drift.abs() <= self.tolerance_cents {
                    self.stable_count = (self.stable_count + 1).min(self.required);
                } else {
                    self.stable_count = 0;
                }
                (smoothed, drift)
            }
        };
        self.previous = Some(smoothed);

        GateReading {
            smoothed,
            drift_cents,
            stable_count: self.stable_count,
            display_worthy: self.stable_count >= self.required,
        }
    }

    /// Forget the smoothing history (e.g. after the voice has been lost).
    pub fn reset(&mut self) {
        self.previous = None;
        self.stable_count = 0;
    }

    pub fn previous(&self) -> Option<f32> {
        self.previous
    }

    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }
}
