//! Offline analysis of a WAV file through the same frame analyzer the live
//! worker uses.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use vocalis_core::{
    buffering::mix_to_mono, AnalysisConfig, AnalysisResult, AudioFrame, FrameAnalyzer,
    FrameOutcome, VoiceRangeProfile,
};

/// Decoded mono audio.
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedResult {
    /// Offset of the frame start from the beginning of the file (seconds).
    pub offset_secs: f64,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub file: String,
    pub sample_rate: u32,
    pub frames: usize,
    pub voiced_frames: usize,
    pub results: Vec<TimedResult>,
    pub range_changes: Vec<VoiceRangeProfile>,
    pub final_range: String,
}

pub fn read_wav_mono(path: &Path) -> Result<MonoAudio> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample.max(1) - 1)) - 1).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mut samples = Vec::with_capacity(interleaved.len() / channels);
    mix_to_mono(&interleaved, channels, &mut samples);
    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Run `audio` through a fresh analyzer, one non-overlapping frame at a time.
///
/// The analysis rate follows the file; range re-evaluation intervals are
/// measured in file time rather than wall-clock time.
pub fn analyze_samples(
    file: &str,
    audio: &MonoAudio,
    mut config: AnalysisConfig,
    voice_range: Option<&str>,
) -> Result<AnalysisReport> {
    config.sample_rate = audio.sample_rate;
    config.max_voice_freq = config.max_voice_freq.min(audio.sample_rate as f32 / 2.0);
    let mut analyzer = FrameAnalyzer::new(config.clone()).context("invalid analysis settings")?;
    if let Some(name) = voice_range {
        analyzer.set_voice_range(name)?;
    }

    let frame_size = config.frame_size;
    if audio.samples.len() < frame_size {
        bail!(
            "{file} is shorter than one analysis frame ({} < {frame_size} samples)",
            audio.samples.len()
        );
    }

    let origin = Instant::now();
    let frame_secs = frame_size as f64 / audio.sample_rate as f64;
    let mut report = AnalysisReport {
        file: file.to_string(),
        sample_rate: audio.sample_rate,
        frames: 0,
        voiced_frames: 0,
        results: Vec::new(),
        range_changes: Vec::new(),
        final_range: String::new(),
    };

    for (i, chunk) in audio.samples.chunks_exact(frame_size).enumerate() {
        let offset_secs = i as f64 * frame_secs;
        let now = origin + Duration::from_secs_f64(offset_secs);
        let outcome = analyzer.process(&AudioFrame::new(chunk.to_vec(), audio.sample_rate), now);
        report.frames += 1;
        if outcome.voice_detected() {
            report.voiced_frames += 1;
        }
        if let FrameOutcome::Pitched {
            result,
            range_change,
        } = outcome
        {
            report.results.push(TimedResult {
                offset_secs,
                result,
            });
            report.range_changes.extend(range_change);
        }
    }
    report.final_range = analyzer.active_range().name.clone();
    Ok(report)
}

pub fn print_report(report: &AnalysisReport) {
    println!(
        "{}: {} frames @ {} Hz, {} voiced, {} pitched",
        report.file,
        report.frames,
        report.sample_rate,
        report.voiced_frames,
        report.results.len()
    );
    for timed in &report.results {
        println!(
            "{:>8.2}s  {}",
            timed.offset_secs,
            crate::listen::format_result(&timed.result)
        );
    }
    for profile in &report.range_changes {
        println!(
            "voice range → {} ({:.0}–{:.0} Hz)",
            profile.name, profile.min_freq, profile.max_freq
        );
    }
    println!("final voice range: {}", report.final_range);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, sample_rate: u32, secs: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * secs) as usize;
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn small_frame_config() -> AnalysisConfig {
        AnalysisConfig {
            frame_size: 4_096,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn held_a4_in_a_wav_file_is_reported() {
        let path = std::env::temp_dir().join(format!("vocalis-analyze-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for s in tone(440.0, 16_000, 2.0) {
            let v = (s * i16::MAX as f32) as i16;
            writer.write_sample(v).expect("left");
            writer.write_sample(v).expect("right");
        }
        writer.finalize().expect("finalize");

        let audio = read_wav_mono(&path).expect("decode");
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples.len(), 32_000);

        let report = analyze_samples("a4.wav", &audio, small_frame_config(), None).expect("analyze");
        let _ = std::fs::remove_file(&path);

        assert_eq!(report.frames, 7);
        assert!(!report.results.is_empty());
        let first = &report.results[0].result;
        assert_eq!(first.note.note, vocalis_core::PitchClass::A);
        assert_eq!(first.note.octave, 4);
        assert!((first.frequency - 440.0).abs() < 5.0, "got {}", first.frequency);
    }

    #[test]
    fn manual_range_is_applied_before_the_first_frame() {
        let audio = MonoAudio {
            samples: tone(220.0, 16_000, 1.0),
            sample_rate: 16_000,
        };
        let report =
            analyze_samples("a3", &audio, small_frame_config(), Some("tenor")).expect("analyze");
        assert_eq!(report.final_range, "Tenor");
        assert!(report.results.iter().all(|r| r.result.voice_range == "Tenor"));
    }

    #[test]
    fn too_short_input_is_an_error() {
        let audio = MonoAudio {
            samples: vec![0.0; 100],
            sample_rate: 16_000,
        };
        assert!(analyze_samples("short", &audio, small_frame_config(), None).is_err());
    }
}
