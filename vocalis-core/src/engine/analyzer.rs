//! Synchronous per-frame analysis chain.
//!
//! ```text
//! validate → classify → noise gate → preprocess → estimate (voice band)
//!          → stability gate → confidence → note/tuning → history → range
//! ```
//!
//! `FrameAnalyzer` owns every piece of mutable analysis state (smoothing,
//! history, voice range). It is driven by exactly one thread: the pipeline
//! worker, or the caller directly for offline analysis.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    buffering::{AudioFrame, PitchHistory, PitchHistoryEntry},
    config::{AnalysisConfig, REFERENCE_RANGE},
    dsp::{rms, NoiseGate, Preprocessor, SpectrumAnalyzer},
    error::{Result, VocalisError},
    ipc::events::AnalysisResult,
    pitch::{
        ConfidenceScorer, FrequencyEstimator, FusedEstimate, GateReading, NoteLabel,
        StabilityGate,
    },
    range::{RangeSettings, VoiceRangeClassifier, VoiceRangeProfile},
    tuning::Tuner,
    vad::{RejectReason, SpectralVoiceClassifier, VadDecision, VoiceActivityDetector},
};

/// Why a frame never reached the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    WrongLength { expected: usize, actual: usize },
    WrongSampleRate { expected: u32, actual: u32 },
    NonFinite,
}

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Malformed frame, dropped before analysis.
    Skipped(SkipReason),
    /// Classified as noise or silence.
    Rejected { rms: f32, reason: RejectReason },
    /// Voice-like, but no estimator produced an in-band frequency.
    NoPitch { rms: f32 },
    /// Pitched, but not yet stable enough to display.
    Unstable { rms: f32, reading: GateReading },
    /// Display-worthy reading.
    Pitched {
        result: AnalysisResult,
        /// New profile when this reading triggered a range change.
        range_change: Option<VoiceRangeProfile>,
    },
}

impl FrameOutcome {
    pub fn rms(&self) -> Option<f32> {
        match self {
            FrameOutcome::Skipped(_) => None,
            FrameOutcome::Rejected { rms, .. }
            | FrameOutcome::NoPitch { rms }
            | FrameOutcome::Unstable { rms, .. } => Some(*rms),
            FrameOutcome::Pitched { result, .. } => Some(result.rms),
        }
    }

    pub fn voice_detected(&self) -> bool {
        !matches!(
            self,
            FrameOutcome::Skipped(_) | FrameOutcome::Rejected { .. }
        )
    }
}

pub struct FrameAnalyzer {
    config: AnalysisConfig,
    reference: f32,
    vad: Box<dyn VoiceActivityDetector>,
    gate: NoiseGate,
    preprocessor: Preprocessor,
    estimator: FrequencyEstimator,
    stability: StabilityGate,
    scorer: ConfidenceScorer,
    tuner: Tuner,
    history: PitchHistory,
    range: VoiceRangeClassifier,
    spectrum: SpectrumAnalyzer,
    pitchless_frames: u32,
}

impl FrameAnalyzer {
    /// Build an analyzer with the spectral voice classifier.
    ///
    /// # Errors
    /// `VocalisError::InvalidConfig` when `config` does not validate.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let vad = SpectralVoiceClassifier::new(config.voice_threshold, config.classifier.clone());
        Self::with_detector(config, Box::new(vad))
    }

    /// Build an analyzer around a caller-supplied voice detector.
    pub fn with_detector(
        config: AnalysisConfig,
        vad: Box<dyn VoiceActivityDetector>,
    ) -> Result<Self> {
        config.validate()?;
        let range = VoiceRangeClassifier::new(
            RangeSettings {
                min_samples: config.range_min_samples,
                min_interval: config.range_min_interval(),
                confidence_threshold: config.range_confidence_threshold,
            },
            config.auto_range_detection,
        );
        Ok(Self {
            reference: config.reference_frequency,
            vad,
            gate: NoiseGate::new(config.noise_gate_threshold),
            preprocessor: Preprocessor::new(
                config.window,
                config.highpass_cutoff_hz,
                config.sample_rate,
            ),
            estimator: FrequencyEstimator::new(
                config.sample_rate,
                config.min_voice_freq,
                config.max_voice_freq,
            ),
            stability: StabilityGate::new(
                config.smoothing_factor,
                config.stability_tolerance_cents,
                config.required_stable_readings,
            ),
            scorer: ConfidenceScorer::new(config.voice_threshold, config.harmonic_weight),
            tuner: Tuner::new(
                config.tuning_mode,
                config.tuning_key,
                config.tuning_tolerance_cents,
            ),
            history: PitchHistory::new(config.history_capacity),
            range,
            spectrum: SpectrumAnalyzer::new(),
            pitchless_frames: 0,
            config,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn reference_frequency(&self) -> f32 {
        self.reference
    }

    pub fn history(&self) -> &PitchHistory {
        &self.history
    }

    pub fn active_range(&self) -> &VoiceRangeProfile {
        self.range.active()
    }

    pub fn is_auto_range(&self) -> bool {
        self.range.is_auto()
    }

    /// Band the estimators accept. Always the configured voice band; the
    /// active profile only labels results.
    pub fn estimation_band(&self) -> (f32, f32) {
        self.estimator.band()
    }

    /// Change A4; takes effect on the next frame.
    ///
    /// # Errors
    /// `VocalisError::InvalidConfig` outside 400–480 Hz.
    pub fn set_reference_frequency(&mut self, hz: f32) -> Result<()> {
        if !REFERENCE_RANGE.contains(&hz) {
            return Err(VocalisError::config(
                "referenceFrequency",
                format!("must be within 400..=480 Hz, got {hz}"),
            ));
        }
        self.reference = hz;
        Ok(())
    }

    /// Manual range override; disables auto detection.
    pub fn set_voice_range(&mut self, name: &str) -> Result<VoiceRangeProfile> {
        self.range.set_manual(name)
    }

    pub fn enable_auto_range(&mut self) {
        self.range.enable_auto();
    }

    /// Forget smoothing state and history; the active range is kept.
    pub fn reset(&mut self) {
        self.vad.reset();
        self.stability.reset();
        self.history.clear();
        self.pitchless_frames = 0;
    }

    /// Run one frame through the full chain.
    pub fn process(&mut self, frame: &AudioFrame, now: Instant) -> FrameOutcome {
        if let Some(reason) = self.validate(frame) {
            debug!(?reason, "skipping malformed frame");
            return FrameOutcome::Skipped(reason);
        }

        let frame_rms = rms(&frame.samples);
        if let VadDecision::Reject(reason) = self.vad.classify(frame) {
            self.note_pitchless();
            return FrameOutcome::Rejected {
                rms: frame_rms,
                reason,
            };
        }

        let gated = self.gate.apply(&frame.samples);
        let prepared = self.preprocessor.process(&mut self.spectrum, &gated);
        let fused: FusedEstimate = self.estimator.estimate(&mut self.spectrum, &prepared);
        if !fused.is_pitched() {
            self.note_pitchless();
            return FrameOutcome::NoPitch { rms: frame_rms };
        }
        self.pitchless_frames = 0;

        let reading = self.stability.update(fused.frequency);
        debug!(
            raw = fused.frequency,
            smoothed = reading.smoothed,
            stable = reading.stable_count,
            methods = fused.candidates.len(),
            "frame estimate"
        );
        if !reading.display_worthy {
            return FrameOutcome::Unstable {
                rms: frame_rms,
                reading,
            };
        }

        let Some(note) = NoteLabel::from_frequency(reading.smoothed, self.reference) else {
            return FrameOutcome::NoPitch { rms: frame_rms };
        };
        let confidence = self.scorer.score(
            &mut self.spectrum,
            &frame.samples,
            frame.sample_rate,
            reading.smoothed,
        );
        let tuning = self.tuner.guide(reading.smoothed, self.reference);
        let timestamp = Utc::now();

        self.history
            .push(PitchHistoryEntry::new(reading.smoothed, note, timestamp));
        self.range.observe(reading.smoothed);
        let range_change = self.range.maybe_reevaluate(&self.history, now);
        if let Some(profile) = &range_change {
            info!(
                profile = %profile.name,
                min_freq = profile.min_freq,
                max_freq = profile.max_freq,
                "voice range reclassified"
            );
        }

        FrameOutcome::Pitched {
            result: AnalysisResult {
                frequency: reading.smoothed,
                note,
                confidence,
                rms: frame_rms,
                tuning,
                voice_range: self.range.active().name.clone(),
                timestamp,
            },
            range_change,
        }
    }

    fn validate(&self, frame: &AudioFrame) -> Option<SkipReason> {
        if frame.is_empty() {
            return Some(SkipReason::Empty);
        }
        if frame.len() != self.config.frame_size {
            return Some(SkipReason::WrongLength {
                expected: self.config.frame_size,
                actual: frame.len(),
            });
        }
        if frame.sample_rate != self.config.sample_rate {
            return Some(SkipReason::WrongSampleRate {
                expected: self.config.sample_rate,
                actual: frame.sample_rate,
            });
        }
        if !frame.is_finite() {
            return Some(SkipReason::NonFinite);
        }
        None
    }

    fn note_pitchless(&mut self) {
        self.pitchless_frames = self.pitchless_frames.saturating_add(1);
        if self.pitchless_frames == self.config.reset_after_silent_frames
            && self.stability.previous().is_some()
        {
            debug!(
                frames = self.pitchless_frames,
                "voice lost, resetting stability gate"
            );
            self.stability.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchClass;
    use std::f32::consts::PI;
    use std::time::Duration;

    const SAMPLE_RATE: u32 = 8_000;
    const FRAME: usize = 8_192;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME,
            ..AnalysisConfig::default()
        }
    }

    fn sine_frame(freq: f32, amplitude: f32) -> AudioFrame {
        AudioFrame::new(
            (0..FRAME)
                .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
                .collect(),
            SAMPLE_RATE,
        )
    }

    #[test]
    fn steady_tone_becomes_display_worthy_on_third_frame() {
        let mut analyzer = FrameAnalyzer::new(config()).expect("valid config");
        let frame = sine_frame(440.0, 0.5);
        let now = Instant::now();

        for _ in 0..2 {
            assert!(matches!(
                analyzer.process(&frame, now),
                FrameOutcome::Unstable { .. }
            ));
        }
        match analyzer.process(&frame, now) {
            FrameOutcome::Pitched { result, .. } => {
                assert!((result.frequency - 440.0).abs() / 440.0 < 0.01);
                assert_eq!((result.note.note, result.note.octave), (PitchClass::A, 4));
                assert!((0.0..=100.0).contains(&result.confidence));
                assert_eq!(result.voice_range, "Full Range");
            }
            other => panic!("expected pitched outcome, got {other:?}"),
        }
        assert_eq!(analyzer.history().len(), 1);
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut analyzer = FrameAnalyzer::new(config()).expect("valid config");
        let now = Instant::now();
        assert_eq!(
            analyzer.process(&AudioFrame::new(Vec::new(), SAMPLE_RATE), now),
            FrameOutcome::Skipped(SkipReason::Empty)
        );
        assert!(matches!(
            analyzer.process(&AudioFrame::new(vec![0.1; 100], SAMPLE_RATE), now),
            FrameOutcome::Skipped(SkipReason::WrongLength { .. })
        ));
        let mut nan = sine_frame(440.0, 0.5);
        nan.samples[10] = f32::NAN;
        assert_eq!(
            analyzer.process(&nan, now),
            FrameOutcome::Skipped(SkipReason::NonFinite)
        );
    }

    #[test]
    fn silence_is_rejected_and_eventually_resets_smoothing() {
        let cfg = AnalysisConfig {
            reset_after_silent_frames: 2,
            ..config()
        };
        let mut analyzer = FrameAnalyzer::new(cfg).expect("valid config");
        let now = Instant::now();
        analyzer.process(&sine_frame(440.0, 0.5), now);
        let silent = AudioFrame::new(vec![0.0; FRAME], SAMPLE_RATE);
        let outcome = analyzer.process(&silent, now);
        assert!(matches!(outcome, FrameOutcome::Rejected { .. }));
        assert!(!outcome.voice_detected());
        analyzer.process(&silent, now);

        // Smoothing restarted: a new note is adopted as-is with count 1.
        match analyzer.process(&sine_frame(220.0, 0.5), now) {
            FrameOutcome::Unstable { reading, .. } => {
                assert_eq!(reading.stable_count, 1);
                assert!((reading.smoothed - 220.0).abs() / 220.0 < 0.01);
            }
            other => panic!("expected unstable outcome, got {other:?}"),
        }
    }

    #[test]
    fn reference_change_relabels_next_frame() {
        let cfg = AnalysisConfig {
            required_stable_readings: 1,
            ..config()
        };
        let mut analyzer = FrameAnalyzer::new(cfg).expect("valid config");
        let frame = sine_frame(440.0, 0.5);
        analyzer.set_reference_frequency(466.16).expect("in band");
        match analyzer.process(&frame, Instant::now()) {
            FrameOutcome::Pitched { result, .. } => {
                assert_eq!(result.note.note, PitchClass::GSharp);
            }
            other => panic!("expected pitched outcome, got {other:?}"),
        }
        assert!(analyzer.set_reference_frequency(500.0).is_err());
        assert_eq!(analyzer.reference_frequency(), 466.16);
    }

    #[test]
    fn manual_range_labels_without_filtering() {
        let cfg = AnalysisConfig {
            required_stable_readings: 1,
            ..config()
        };
        let mut analyzer = FrameAnalyzer::new(cfg).expect("valid config");
        analyzer.set_voice_range("Soprano").expect("known range");
        assert!(!analyzer.is_auto_range());
        assert_eq!(analyzer.estimation_band(), (80.0, 2_000.0));

        match analyzer.process(&sine_frame(110.0, 0.5), Instant::now()) {
            FrameOutcome::Pitched { result, .. } => {
                assert!((result.frequency - 110.0).abs() / 110.0 < 0.02, "{}", result.frequency);
                assert_eq!(result.voice_range, "Soprano");
            }
            other => panic!("expected pitched outcome, got {other:?}"),
        }
    }

    #[test]
    fn auto_range_reclassifies_after_enough_history() {
        let cfg = AnalysisConfig {
            required_stable_readings: 1,
            smoothing_factor: 0.0,
            stability_tolerance_cents: 1_200.0,
            range_min_samples: 4,
            range_min_interval_ms: 0,
            ..config()
        };
        let mut analyzer = FrameAnalyzer::new(cfg).expect("valid config");
        let start = Instant::now();
        let mut change = None;
        for (i, freq) in [196.0, 220.0, 247.0, 262.0, 233.0].into_iter().enumerate() {
            if let FrameOutcome::Pitched { range_change, .. } =
                analyzer.process(&sine_frame(freq, 0.5), start + Duration::from_millis(i as u64))
            {
                change = change.or(range_change);
            }
        }
        let profile = change.expect("range reclassified");
        assert_ne!(profile.name, "Full Range");
        assert_eq!(analyzer.active_range(), &profile);
    }

    #[test]
    fn auto_range_widens_again_after_settling_low() {
        let cfg = AnalysisConfig {
            required_stable_readings: 1,
            smoothing_factor: 0.0,
            stability_tolerance_cents: 6_000.0,
            range_min_samples: 4,
            range_min_interval_ms: 0,
            ..config()
        };
        let mut analyzer = FrameAnalyzer::new(cfg).expect("valid config");
        let start = Instant::now();
        // 8000 / 7: an exact seven-sample period.
        let high = SAMPLE_RATE as f32 / 7.0;
        let phrase = [110.0, 130.81, 164.81, 196.0, high, 110.0, high, 110.0];

        let mut changes = Vec::new();
        for (i, freq) in phrase.into_iter().enumerate() {
            let now = start + Duration::from_millis(i as u64);
            match analyzer.process(&sine_frame(freq, 0.5), now) {
                FrameOutcome::Pitched {
                    result,
                    range_change,
                } => {
                    assert!(
                        (result.frequency - freq).abs() / freq < 0.02,
                        "sang {freq}, reported {}",
                        result.frequency
                    );
                    changes.extend(range_change.map(|p| p.name));
                }
                other => panic!("expected pitched outcome for {freq}, got {other:?}"),
            }
        }

        assert_eq!(changes, vec!["Bass".to_string(), "Full Range".to_string()]);
        assert_eq!(analyzer.active_range().name, "Full Range");
        assert!(analyzer.is_auto_range());
    }
}
