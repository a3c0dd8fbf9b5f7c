//! Adaptive voice-range classification.
//!
//! ## Algorithm
//!
//! 1. Take the newest `min_samples` history frequencies and their min/max.
//! 2. Pad both ends by 10% of the observed span; clamp to [80, 1200] Hz.
//! 3. Score every catalog profile by how much of the detected band it covers
//!    and how much of its own band the detected range fills:
//!    `0.7 * coverage + 0.3 * fit`.
//! 4. Take the best (ties keep catalog order); below the confidence threshold
//!    fall back to "Full Range".
//!
//! Re-evaluation is rate-limited by sample count and elapsed time. A manual
//! selection turns auto mode off and freezes the profile until re-enabled.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffering::PitchHistory;
use crate::error::{Result, VocalisError};

pub const FULL_RANGE: &str = "Full Range";

const DETECTION_FLOOR_HZ: f32 = 80.0;
const DETECTION_CEILING_HZ: f32 = 1_200.0;
const PADDING_FRACTION: f32 = 0.1;
const COVERAGE_WEIGHT: f32 = 0.7;
const FIT_WEIGHT: f32 = 0.3;

/// A named frequency band; `min_freq < max_freq` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRangeProfile {
    pub name: String,
    pub min_freq: f32,
    pub max_freq: f32,
}

impl VoiceRangeProfile {
    /// `None` unless `0 < min_freq < max_freq`.
    pub fn new(name: impl Into<String>, min_freq: f32, max_freq: f32) -> Option<Self> {
        if min_freq > 0.0 && min_freq < max_freq {
            Some(Self {
                name: name.into(),
                min_freq,
                max_freq,
            })
        } else {
            None
        }
    }

    fn fixed(name: &str, min_freq: f32, max_freq: f32) -> Self {
        Self {
            name: name.to_string(),
            min_freq,
            max_freq,
        }
    }

    /// Bass, Tenor, Alto, Soprano, Full Range.
    pub fn catalog() -> Vec<VoiceRangeProfile> {
        vec![
            Self::fixed("Bass", 87.31, 349.23),
            Self::fixed("Tenor", 130.81, 523.25),
            Self::fixed("Alto", 174.61, 698.46),
            Self::fixed("Soprano", 261.63, 1_046.50),
            Self::full_range(),
        ]
    }

    pub fn full_range() -> Self {
        Self::fixed(FULL_RANGE, 80.0, 2_000.0)
    }

    /// Case-insensitive catalog lookup.
    pub fn find(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::catalog()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
    }

    pub fn width(&self) -> f32 {
        self.max_freq - self.min_freq
    }

    pub fn contains(&self, frequency: f32) -> bool {
        frequency >= self.min_freq && frequency <= self.max_freq
    }

    /// Weighted coverage/fit score of this profile against a detected band.
    pub fn score(&self, detected_min: f32, detected_max: f32) -> f32 {
        let detected_width = detected_max - detected_min;
        let profile_width = self.width();
        if detected_width <= 0.0 || profile_width <= 0.0 {
            return 0.0;
        }
        let overlap =
            (detected_max.min(self.max_freq) - detected_min.max(self.min_freq)).max(0.0);
        COVERAGE_WEIGHT * (overlap / detected_width) + FIT_WEIGHT * (overlap / profile_width)
    }
}

/// Tunables taken from the analysis configuration.
#[derive(Debug, Clone, Copy)]
pub struct RangeSettings {
    pub min_samples: usize,
    pub min_interval: Duration,
    pub confidence_threshold: f32,
}

/// Owns the active profile and decides when to swap it.
#[derive(Debug, Clone)]
pub struct VoiceRangeClassifier {
    settings: RangeSettings,
    catalog: Vec<VoiceRangeProfile>,
    active: VoiceRangeProfile,
    auto: bool,
    observed: Option<(f32, f32)>,
    last_evaluation: Option<Instant>,
}

impl VoiceRangeClassifier {
    pub fn new(settings: RangeSettings, auto: bool) -> Self {
        Self {
            settings,
            catalog: VoiceRangeProfile::catalog(),
            active: VoiceRangeProfile::full_range(),
            auto,
            observed: None,
            last_evaluation: None,
        }
    }

    pub fn active(&self) -> &VoiceRangeProfile {
        &self.active
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Lowest and highest accepted frequency seen this session.
    pub fn observed_range(&self) -> Option<(f32, f32)> {
        self.observed
    }

    /// Track an accepted frequency in the running min/max.
    pub fn observe(&mut self, frequency: f32) {
        if !(frequency > 0.0) {
            return;
        }
        self.observed = Some(match self.observed {
            None => (frequency, frequency),
            Some((lo, hi)) => (lo.min(frequency), hi.max(frequency)),
        });
    }

    /// Padded, clamped band of the newest `min_samples` history entries.
    pub fn detected_band(&self, history: &PitchHistory) -> Option<(f32, f32)> {
        let recent = history.recent_frequencies(self.settings.min_samples);
        if recent.len() < self.settings.min_samples || recent.is_empty() {
            return None;
        }
        let lo = recent.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = recent.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let pad = (hi - lo) * PADDING_FRACTION;
        let lo = (lo - pad).max(DETECTION_FLOOR_HZ);
        let hi = (hi + pad).min(DETECTION_CEILING_HZ);
        (hi > lo).then_some((lo, hi))
    }

    /// Best-scoring profile for a detected band, with the Full Range fallback.
    pub fn classify(&self, detected_min: f32, detected_max: f32) -> VoiceRangeProfile {
        let mut best: Option<(&VoiceRangeProfile, f32)> = None;
        for profile in &self.catalog {
            let score = profile.score(detected_min, detected_max);
            debug!(profile = %profile.name, score, "voice range score");
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((profile, score));
            }
        }
        match best {
            Some((profile, score)) if score >= self.settings.confidence_threshold => {
                profile.clone()
            }
            _ => VoiceRangeProfile::full_range(),
        }
    }

    /// Re-evaluate if auto mode is on and enough samples and time have
    /// accumulated. Returns the new profile only when it changed.
    pub fn maybe_reevaluate(
        &mut self,
        history: &PitchHistory,
        now: Instant,
    ) -> Option<VoiceRangeProfile> {
        if !self.auto || history.len() < self.settings.min_samples {
            return None;
        }
        if let Some(last) = self.last_evaluation {
            if now.saturating_duration_since(last) < self.settings.min_interval {
                return None;
            }
        }
        self.last_evaluation = Some(now);

        let (lo, hi) = self.detected_band(history)?;
        let selected = self.classify(lo, hi);
        if selected == self.active {
            return None;
        }
        self.active = selected.clone();
        Some(selected)
    }

    /// Manual override: select `name` and disable auto mode.
    ///
    /// # Errors
    /// `VocalisError::UnknownVoiceRange` when `name` is not in the catalog.
    pub fn set_manual(&mut self, name: &str) -> Result<VoiceRangeProfile> {
        let profile = VoiceRangeProfile::find(name)
            .ok_or_else(|| VocalisError::UnknownVoiceRange(name.to_string()))?;
        self.auto = false;
        self.active = profile.clone();
        Ok(profile)
    }

    pub fn enable_auto(&mut self) {
        self.auto = true;
        self.last_evaluation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::PitchHistoryEntry;
    use crate::pitch::note::NoteLabel;
    use approx::assert_abs_diff_eq;
    use chrono::Utc;

    fn settings() -> RangeSettings {
        RangeSettings {
            min_samples: 20,
            min_interval: Duration::from_millis(2_000),
            confidence_threshold: 0.6,
        }
    }

    fn history_spanning(lo: f32, hi: f32, n: usize) -> PitchHistory {
        let mut history = PitchHistory::new(100);
        for i in 0..n {
            let f = lo + (hi - lo) * i as f32 / (n - 1) as f32;
            let label = NoteLabel::from_frequency(f, 440.0).expect("label");
            history.push(PitchHistoryEntry::new(f, label, Utc::now()));
        }
        history
    }

    #[test]
    fn catalog_bounds_are_ordered() {
        for profile in VoiceRangeProfile::catalog() {
            assert!(profile.min_freq < profile.max_freq, "{}", profile.name);
        }
        assert!(VoiceRangeProfile::new("bad", 300.0, 200.0).is_none());
        assert_eq!(VoiceRangeProfile::find("tenor").map(|p| p.name), Some("Tenor".into()));
    }

    #[test]
    fn mid_low_cluster_selects_a_covering_profile() {
        let mut classifier = VoiceRangeClassifier::new(settings(), true);
        let history = history_spanning(150.0, 300.0, 20);

        let (lo, hi) = classifier.detected_band(&history).expect("band");
        assert_abs_diff_eq!(lo, 135.0, epsilon = 1e-3);
        assert_abs_diff_eq!(hi, 315.0, epsilon = 1e-3);

        let selected = classifier
            .maybe_reevaluate(&history, Instant::now())
            .expect("profile changes away from Full Range");
        assert_ne!(selected.name, FULL_RANGE);
        assert!(selected.contains(150.0) && selected.contains(300.0));
        assert_eq!(classifier.active(), &selected);
    }

    #[test]
    fn wide_history_selects_full_range() {
        let mut classifier = VoiceRangeClassifier::new(settings(), true);
        classifier.set_manual("Alto").expect("known profile");
        classifier.enable_auto();

        let history = history_spanning(80.0, 2_000.0, 20);
        let selected = classifier
            .maybe_reevaluate(&history, Instant::now())
            .expect("switches from Alto");
        assert_eq!(selected.name, FULL_RANGE);
    }

    #[test]
    fn low_best_score_falls_back_to_full_range() {
        let classifier = VoiceRangeClassifier::new(
            RangeSettings {
                confidence_threshold: 0.95,
                ..settings()
            },
            true,
        );
        assert_eq!(classifier.classify(135.0, 315.0).name, FULL_RANGE);
    }

    #[test]
    fn reevaluation_waits_for_samples_and_interval() {
        let mut classifier = VoiceRangeClassifier::new(settings(), true);
        let start = Instant::now();

        assert!(classifier
            .maybe_reevaluate(&history_spanning(150.0, 300.0, 19), start)
            .is_none());

        let low = history_spanning(150.0, 300.0, 20);
        assert!(classifier.maybe_reevaluate(&low, start).is_some());

        let high = history_spanning(500.0, 900.0, 20);
        assert!(classifier
            .maybe_reevaluate(&high, start + Duration::from_millis(500))
            .is_none());
        let changed = classifier
            .maybe_reevaluate(&high, start + Duration::from_millis(2_500))
            .expect("interval elapsed");
        assert!(changed.contains(500.0) && changed.contains(900.0));
    }

    #[test]
    fn manual_override_freezes_selection() {
        let mut classifier = VoiceRangeClassifier::new(settings(), true);
        let profile = classifier.set_manual("Soprano").expect("known profile");
        assert_eq!(profile.name, "Soprano");
        assert!(!classifier.is_auto());
        assert!(classifier
            .maybe_reevaluate(&history_spanning(80.0, 2_000.0, 20), Instant::now())
            .is_none());
        assert_eq!(classifier.active().name, "Soprano");

        assert!(matches!(
            classifier.set_manual("Countertenor"),
            Err(VocalisError::UnknownVoiceRange(_))
        ));
    }

    #[test]
    fn observe_tracks_running_extremes() {
        let mut classifier = VoiceRangeClassifier::new(settings(), true);
        for f in [220.0, 180.0, 0.0, 310.0] {
            classifier.observe(f);
        }
        assert_eq!(classifier.observed_range(), Some((180.0, 310.0)));
    }
}
