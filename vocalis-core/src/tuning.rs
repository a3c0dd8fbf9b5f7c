//! Nearest-target tuning guidance in a chosen scale.

use serde::{Deserialize, Serialize};

use crate::pitch::note::{cents_between, note_frequency, PitchClass};

/// Deviation (cents) still reported as close.
pub const CLOSE_TOLERANCE_CENTS: f32 = 25.0;

/// Which notes count as tuning targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    #[default]
    Chromatic,
    MajorScale,
    MinorScale,
    Pentatonic,
}

impl TuningMode {
    /// Scale degrees in semitones above the key.
    pub fn degrees(self) -> &'static [i32] {
        match self {
            TuningMode::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            TuningMode::MajorScale => &[0, 2, 4, 5, 7, 9, 11],
            TuningMode::MinorScale => &[0, 2, 3, 5, 7, 8, 10],
            TuningMode::Pentatonic => &[0, 2, 4, 7, 9],
        }
    }

    pub fn contains(self, key: PitchClass, note: PitchClass) -> bool {
        let degree = (note.index() - key.index()).rem_euclid(12);
        self.degrees().contains(&degree)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningStatus {
    InTune,
    Close,
    OutOfTune,
}

impl TuningStatus {
    pub fn from_deviation(deviation_cents: f32, tolerance_cents: f32) -> Self {
        let d = deviation_cents.abs();
        if d <= tolerance_cents {
            TuningStatus::InTune
        } else if d <= CLOSE_TOLERANCE_CENTS.max(tolerance_cents) {
            TuningStatus::Close
        } else {
            TuningStatus::OutOfTune
        }
    }
}

/// Where the singer should be heading and how far off they are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningGuide {
    pub target_note: PitchClass,
    pub target_octave: i32,
    pub target_frequency: f32,
    /// Signed cents from the target to the sung frequency.
    pub deviation_cents: f32,
    pub status: TuningStatus,
}

/// Guide settings resolved from the analysis configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuner {
    pub mode: TuningMode,
    pub key: PitchClass,
    pub tolerance_cents: f32,
}

impl Tuner {
    pub fn new(mode: TuningMode, key: PitchClass, tolerance_cents: f32) -> Self {
        Self {
            mode,
            key,
            tolerance_cents,
        }
    }

    /// Guide toward the nearest in-scale note. `None` for non-positive input.
    pub fn guide(&self, frequency: f32, reference: f32) -> Option<TuningGuide> {
        if !(frequency > 0.0 && reference > 0.0) || !frequency.is_finite() {
            return None;
        }
        let semitones = 12.0 * (frequency as f64 / reference as f64).log2();
        let center = semitones.round() as i32;

        // Every mode has a degree within 6 semitones of any pitch.
        let target = (-6..=6)
            .map(|offset| center + offset)
            .filter(|&n| self.mode.contains(self.key, PitchClass::from_index(n + 9)))
            .min_by(|a, b| {
                let da = (semitones - *a as f64).abs();
                let db = (semitones - *b as f64).abs();
                da.total_cmp(&db)
            })?;

        let note = PitchClass::from_index(target + 9);
        let octave = 4 + (target + 9).div_euclid(12);
        let target_frequency = note_frequency(note, octave, 0.0, reference);
        let deviation_cents = cents_between(target_frequency, frequency);
        Some(TuningGuide {
            target_note: note,
            target_octave: octave,
            target_frequency,
            deviation_cents,
            status: TuningStatus::from_deviation(deviation_cents, self.tolerance_cents),
        })
    }
}
