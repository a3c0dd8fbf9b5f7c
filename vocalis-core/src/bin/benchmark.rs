//! Estimator accuracy / latency sweep over synthetic voice-like tones.
//!
//! ```text
//! cargo run -p vocalis-core --release --bin benchmark -- [--noise 0.05] [--output report.json]
//! ```

use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use vocalis_core::{
    config::AnalysisConfig,
    dsp::{Preprocessor, SpectrumAnalyzer},
    pitch::{cents_between, EstimationMethod, FrequencyEstimator},
};

#[derive(Debug)]
struct Args {
    noise: f32,
    iterations: usize,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct CaseResult {
    method: String,
    target_hz: f32,
    estimate_hz: f32,
    error_cents: Option<f32>,
    latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
struct MethodSummary {
    method: String,
    runs: usize,
    miss_rate: f64,
    p50_error_cents: f64,
    p95_error_cents: f64,
    p50_latency_ms: f64,
    p95_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    sample_rate: u32,
    frame_size: usize,
    noise: f32,
    iterations: usize,
    total_runs: usize,
    methods: Vec<MethodSummary>,
    cases: Vec<CaseResult>,
}

const FUSED: &str = "fused";
/// Lowest and highest swept notes, in semitones from A4 (F2..C6).
const SWEEP: std::ops::RangeInclusive<i32> = -28..=15;

fn main() {
    if let Err(e) = run() {
        eprintln!("benchmark failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut noise = 0.0f32;
    let mut iterations: usize = 1;
    let mut output: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--noise" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --noise".into());
                };
                noise = v
                    .parse::<f32>()
                    .map_err(|_| "invalid value for --noise".to_string())?
                    .clamp(0.0, 1.0);
            }
            "--iterations" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --iterations".into());
                };
                iterations = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --iterations".to_string())?
                    .clamp(1, 20);
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                output = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p vocalis-core --release --bin benchmark -- \\
  [--noise <0..1>] [--iterations <n>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Args {
        noise,
        iterations,
        output,
    })
}

/// Fundamental with 1/h harmonics up to Nyquist, plus deterministic noise.
fn voice_like(freq: f32, sample_rate: u32, len: usize, noise: f32, seed: u32) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(1);
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let mut v = 0.0;
            let mut h = 1;
            while h <= 8 && freq * (h as f32) < nyquist {
                v += (0.3 / h as f32) * (2.0 * PI * freq * h as f32 * t).sin();
                h += 1;
            }
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let n = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
            v + noise * n
        })
        .collect()
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn summarize(method: String, rows: &[CaseResult]) -> MethodSummary {
    let errors = rows
        .iter()
        .filter_map(|r| r.error_cents.map(|c| f64::from(c.abs())))
        .collect::<Vec<_>>();
    let latencies = rows.iter().map(|r| r.latency_ms).collect::<Vec<_>>();
    let misses = rows.iter().filter(|r| r.error_cents.is_none()).count();
    MethodSummary {
        method,
        runs: rows.len(),
        miss_rate: if rows.is_empty() {
            0.0
        } else {
            misses as f64 / rows.len() as f64
        },
        p50_error_cents: percentile(&errors, 0.50),
        p95_error_cents: percentile(&errors, 0.95),
        p50_latency_ms: percentile(&latencies, 0.50),
        p95_latency_ms: percentile(&latencies, 0.95),
    }
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let config = AnalysisConfig::default();
    let sample_rate = config.sample_rate;
    let frame_size = config.frame_size;

    let preprocessor = Preprocessor::new(config.window, config.highpass_cutoff_hz, sample_rate);
    let estimator =
        FrequencyEstimator::new(sample_rate, config.min_voice_freq, config.max_voice_freq);
    let mut analyzer = SpectrumAnalyzer::new();

    println!(
        "Running Vocalis estimator sweep ({} notes, iterations={}, noise={})",
        SWEEP.clone().count(),
        args.iterations,
        args.noise
    );

    let mut cases = Vec::new();
    for semitone in SWEEP {
        let target = config.reference_frequency * 2f32.powf(semitone as f32 / 12.0);
        for iteration in 0..args.iterations {
            let seed = (semitone + 100) as u32 * 31 + iteration as u32;
            let raw = voice_like(target, sample_rate, frame_size, args.noise, seed);
            let prepared = preprocessor.process(&mut analyzer, &raw);

            for method in EstimationMethod::ALL {
                let started = Instant::now();
                let estimate = method.estimate(&mut analyzer, &prepared, sample_rate);
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                cases.push(CaseResult {
                    method: method.label().into(),
                    target_hz: target,
                    estimate_hz: estimate,
                    error_cents: (estimate > 0.0).then(|| cents_between(target, estimate)),
                    latency_ms,
                });
            }

            let started = Instant::now();
            let fused = estimator.estimate(&mut analyzer, &prepared);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            cases.push(CaseResult {
                method: FUSED.into(),
                target_hz: target,
                estimate_hz: fused.frequency,
                error_cents: fused
                    .is_pitched()
                    .then(|| cents_between(target, fused.frequency)),
                latency_ms,
            });
        }
    }

    let mut grouped: BTreeMap<String, Vec<CaseResult>> = BTreeMap::new();
    for row in &cases {
        grouped.entry(row.method.clone()).or_default().push(row.clone());
    }
    let methods = grouped
        .into_iter()
        .map(|(name, rows)| summarize(name, &rows))
        .collect::<Vec<_>>();

    for m in &methods {
        println!(
            "{:>8}: p50={:.1}c p95={:.1}c miss={:.1}% latency p50={:.2}ms p95={:.2}ms",
            m.method,
            m.p50_error_cents,
            m.p95_error_cents,
            m.miss_rate * 100.0,
            m.p50_latency_ms,
            m.p95_latency_ms
        );
    }

    let summary = Summary {
        sample_rate,
        frame_size,
        noise: args.noise,
        iterations: args.iterations,
        total_runs: cases.len(),
        methods,
        cases,
    };

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
