//! Frequency ↔ musical note conversion relative to a configurable A4.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The twelve pitch classes, C-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PitchClass {
    #[default]
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C (0..12).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Pitch class `semitones` above C, wrapping in both directions.
    pub fn from_index(semitones: i32) -> Self {
        Self::ALL[semitones.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Parse "C", "c#", "Db" style names.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let offset = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return None,
        };
        Some(Self::from_index(base + offset))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Note name, octave and deviation of a frequency from the nearest
/// equal-tempered semitone.
///
/// Always derived from a frequency via [`NoteLabel::from_frequency`]; the
/// cents value is never stored apart from the frequency it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteLabel {
    pub note: PitchClass,
    pub octave: i32,
    /// Deviation from the nearest semitone, roughly in [-50, 50].
    pub cents: f32,
}

impl NoteLabel {
    /// Label `frequency` relative to `reference` (A4). `None` for non-positive input.
    pub fn from_frequency(frequency: f32, reference: f32) -> Option<Self> {
        if !(frequency > 0.0 && reference > 0.0) || !frequency.is_finite() {
            return None;
        }
        let semitones = 12.0 * (frequency as f64 / reference as f64).log2();
        let nearest = semitones.round();
        let nearest_i = nearest as i32;
        Some(Self {
            // A sits 9 semitones above C.
            note: PitchClass::from_index(nearest_i + 9),
            octave: 4 + (nearest_i + 9).div_euclid(12),
            cents: ((semitones - nearest) * 100.0) as f32,
        })
    }

    /// Semitones of this note (ignoring cents) relative to A4.
    pub fn semitones_from_a4(&self) -> i32 {
        semitones_from_a4(self.note, self.octave)
    }

    /// Frequency of this label, cents included.
    pub fn frequency(&self, reference: f32) -> f32 {
        note_frequency(self.note, self.octave, self.cents, reference)
    }
}

impl fmt::Display for NoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {:+.0}¢", self.note, self.octave, self.cents)
    }
}

/// Semitones from A4 to `note` in `octave`.
pub fn semitones_from_a4(note: PitchClass, octave: i32) -> i32 {
    (octave - 4) * 12 + note.index() - PitchClass::A.index()
}

/// Frequency of `note`/`octave` offset by `cents`, with `reference` as A4.
pub fn note_frequency(note: PitchClass, octave: i32, cents: f32, reference: f32) -> f32 {
    let semitones = semitones_from_a4(note, octave) as f64 + cents as f64 / 100.0;
    (reference as f64 * 2f64.powf(semitones / 12.0)) as f32
}

/// Signed distance in cents from `from` to `to`. 0 when either is non-positive.
pub fn cents_between(from: f32, to: f32) -> f32 {
    if !(from > 0.0 && to > 0.0) {
        return 0.0;
    }
    (1200.0 * (to as f64 / from as f64).log2()) as f32
}
