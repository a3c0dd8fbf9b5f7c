//! Persistent tuner settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vocalis_core::{AnalysisConfig, ClassifierConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TunerSettings {
    pub preferred_input_device: Option<String>,
    pub analysis: AnalysisConfig,
}

impl TunerSettings {
    /// Clamp every value into the range the engine accepts, so a hand-edited
    /// file never stops the tuner from starting.
    pub fn normalize(&mut self) {
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let defaults = AnalysisConfig::default();
        let a = &mut self.analysis;
        a.sample_rate = a.sample_rate.clamp(8_000, 192_000);
        a.channels = a.channels.clamp(1, 32);
        a.frame_size = a.frame_size.clamp(64, 8_192);

        let nyquist = a.sample_rate as f32 / 2.0;
        a.min_voice_freq = finite_or(a.min_voice_freq, defaults.min_voice_freq).clamp(20.0, nyquist);
        a.max_voice_freq = finite_or(a.max_voice_freq, defaults.max_voice_freq).min(nyquist);
        if a.max_voice_freq <= a.min_voice_freq {
            a.min_voice_freq = defaults.min_voice_freq;
            a.max_voice_freq = defaults.max_voice_freq.min(nyquist);
        }

        a.reference_frequency =
            finite_or(a.reference_frequency, defaults.reference_frequency).clamp(400.0, 480.0);
        a.voice_threshold = finite_or(a.voice_threshold, defaults.voice_threshold).clamp(0.0, 1.0);
        a.noise_gate_threshold =
            finite_or(a.noise_gate_threshold, defaults.noise_gate_threshold).clamp(0.0, 1.0);
        a.smoothing_factor = finite_or(a.smoothing_factor, defaults.smoothing_factor).clamp(0.0, 0.99);
        a.stability_tolerance_cents =
            finite_or(a.stability_tolerance_cents, defaults.stability_tolerance_cents)
                .clamp(0.0, 1_200.0);
        a.required_stable_readings = a.required_stable_readings.clamp(1, 50);
        a.history_capacity = a.history_capacity.clamp(1, 10_000);
        a.range_min_samples = a.range_min_samples.clamp(1, a.history_capacity);
        if !(a.harmonic_weight > 0.0) || !a.harmonic_weight.is_finite() {
            a.harmonic_weight = defaults.harmonic_weight;
        }
        a.range_confidence_threshold =
            finite_or(a.range_confidence_threshold, defaults.range_confidence_threshold)
                .clamp(0.0, 1.0);
        a.highpass_cutoff_hz = finite_or(a.highpass_cutoff_hz, defaults.highpass_cutoff_hz)
            .clamp(0.0, a.min_voice_freq);
        a.tuning_tolerance_cents =
            finite_or(a.tuning_tolerance_cents, defaults.tuning_tolerance_cents).clamp(0.0, 50.0);

        let c = &a.classifier;
        if !(c.centroid_min_hz < c.centroid_max_hz && c.zcr_min < c.zcr_max)
            || !(0.0..=1.0).contains(&c.rolloff_fraction)
        {
            a.classifier = ClassifierConfig::default();
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Vocalis")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vocalis")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> TunerSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<TunerSettings>(&raw).unwrap_or_else(|e| {
            tracing::warn!("ignoring malformed settings at {}: {e}", path.display());
            TunerSettings::default()
        }),
        Err(_) => TunerSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &TunerSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
