//! Live terminal presentation of engine events.
//!
//! The engine publishes on broadcast channels; this module only renders what
//! arrives and never touches analysis state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use vocalis_core::{AnalysisResult, EngineStatus, PitchEngine, TuningStatus};

/// Quiet time after the last pitch before the idle line is shown.
const IDLE_AFTER: Duration = Duration::from_millis(1_500);

pub struct ListenOptions {
    pub device: Option<String>,
    pub reference: Option<f32>,
    pub voice_range: Option<String>,
}

/// One display line for a pitch result.
pub fn format_result(result: &AnalysisResult) -> String {
    let mut line = format!(
        "{:>4}{:<2} {:+4.0}¢  {:7.2} Hz  conf {:3.0}%  [{}]",
        result.note.note.name(),
        result.note.octave,
        result.note.cents,
        result.frequency,
        result.confidence,
        result.voice_range
    );
    if let Some(guide) = &result.tuning {
        let marker = match guide.status {
            TuningStatus::InTune => "in tune",
            TuningStatus::Close => "close",
            TuningStatus::OutOfTune => "out of tune",
        };
        line.push_str(&format!(
            "  → {}{} {:+.0}¢ {marker}",
            guide.target_note, guide.target_octave, guide.deviation_cents
        ));
    }
    line
}

pub async fn run(engine: Arc<PitchEngine>, options: ListenOptions) -> Result<()> {
    if let Some(hz) = options.reference {
        engine
            .set_reference_frequency(hz)
            .context("invalid --reference")?;
    }
    if let Some(name) = options.voice_range.as_deref() {
        engine.set_voice_range(name).context("invalid --range")?;
    }

    let mut results = engine.subscribe_results();
    let mut ranges = engine.subscribe_voice_range();
    let mut statuses = engine.subscribe_status();

    // start() blocks until the device is open; keep it off the async workers.
    let starter = Arc::clone(&engine);
    let device = options.device.clone();
    tokio::task::spawn_blocking(move || starter.start_with_device(device))
        .await
        .context("engine start task failed")?
        .context("failed to start audio capture")?;
    info!("listening; press Ctrl-C to stop");
    println!("listening…");

    let mut last_pitch = Instant::now();
    let mut idle_shown = true;
    let mut idle_tick = tokio::time::interval(Duration::from_millis(250));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
            event = results.recv() => match event {
                Ok(event) => {
                    println!("{}", format_result(&event.result));
                    last_pitch = Instant::now();
                    idle_shown = false;
                }
                Err(RecvError::Lagged(n)) => warn!("result receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            },
            event = ranges.recv() => match event {
                Ok(event) => println!(
                    "voice range → {} ({:.0}–{:.0} Hz){}",
                    event.profile.name,
                    event.profile.min_freq,
                    event.profile.max_freq,
                    if event.auto_detected { ", detected" } else { "" }
                ),
                Err(RecvError::Lagged(n)) => warn!("range receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            },
            event = statuses.recv() => match event {
                Ok(event) if event.status == EngineStatus::Error => {
                    eprintln!(
                        "capture error: {}",
                        event.detail.as_deref().unwrap_or("unknown")
                    );
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("status receiver lagged by {n} events"),
                Err(RecvError::Closed) => break,
            },
            _ = idle_tick.tick() => {
                if !idle_shown && last_pitch.elapsed() >= IDLE_AFTER {
                    println!("listening…");
                    idle_shown = true;
                }
            }
        }
    }

    let stopper = Arc::clone(&engine);
    match tokio::task::spawn_blocking(move || stopper.stop()).await? {
        Ok(()) => {}
        // Already stopped by a stream error.
        Err(vocalis_core::VocalisError::NotRunning) => {}
        Err(e) => return Err(e.into()),
    }
    let diag = engine.diagnostics_snapshot();
    info!(
        frames = diag.frames_in,
        emitted = diag.results_emitted,
        "listening stopped"
    );
    Ok(())
}
